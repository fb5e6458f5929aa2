use crate::consts::{
    PREAMBLE_BYTE, RDM_CHECKSUM_SIZE, RDM_DISCOVERY_RESPONSE_SIZE, RDM_MAX_DISCOVERY_RESPONSE_SIZE,
    RDM_MAX_PACKAGE_SIZE, RDM_MESSAGE_MIN_LENGTH, SC_RDM, SC_SUB_MESSAGE,
    SEPARATOR_BYTE,
};
use crate::layouts::{discovery_response_layout, rdm_message_layout};
use crate::rdm_types::{DataPack, RequestCommandClass, ResponseCommandClass, ResponseType};
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};
use crate::utils::{calculate_checksum, decode_disc_unique, encode_disc_unique};

/// Binary representation of an RDM package.
pub type BinaryRdmPackage = heapless::Vec<u8, RDM_MAX_PACKAGE_SIZE>;

/// Binary representation of a discovery response including preamble and separator.
pub type BinaryDiscoveryResponse = [u8; RDM_MAX_DISCOVERY_RESPONSE_SIZE];

/// Error that gets raised when attempting to answer a request that was sent to a
/// broadcast address.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsBroadcastError;

impl core::fmt::Display for IsBroadcastError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "tried to convert broadcast request to response")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IsBroadcastError {}

/// An RDM request that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmRequestData {
    pub destination_uid: PackageAddress,
    pub source_uid: UniqueIdentifier,
    pub transaction_number: u8,
    pub port_id: u8,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: RequestCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

impl RdmRequestData {
    /// Builds the response a responder with the uid `responder_uid` sends back.
    /// Requests to broadcast addresses are never answered.
    pub fn build_response(
        &self,
        responder_uid: UniqueIdentifier,
        response_type: ResponseType,
        response: DataPack,
        message_count: u8,
    ) -> Result<RdmResponseData, IsBroadcastError> {
        if self.destination_uid.is_broadcast() {
            return Err(IsBroadcastError);
        }

        Ok(RdmResponseData {
            destination_uid: PackageAddress::Device(self.source_uid),
            source_uid: responder_uid,
            transaction_number: self.transaction_number,
            response_type,
            message_count,
            sub_device: self.sub_device,
            command_class: self.command_class.response_class(),
            parameter_id: self.parameter_id,
            parameter_data: response,
        })
    }
}

/// An RDM response that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmResponseData {
    pub destination_uid: PackageAddress,
    pub source_uid: UniqueIdentifier,
    pub transaction_number: u8,
    pub response_type: ResponseType,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: ResponseCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RdmDeserializationError {
    /// Buffer must be at least 26 bytes
    BufferTooSmall,
    /// Buffer must be at most 257 bytes
    BufferTooBig,
    /// The command class was not found; contains contents of command class field
    CommandClassNotFound(u8),
    /// The response type was not found; contains contents of response type field
    ResponseTypeNotFound(u8),
    /// The message length field is incorrect; contains result of parsing
    WrongMessageLength(usize),
    /// Wrong checksum
    WrongChecksum,
    /// Received wrong start code (0xCC) or sub start code (0x01)
    WrongStartCode,
    /// The source uid is a broadcast address.
    SourceUidIsBroadcast,
}

impl core::fmt::Display for RdmDeserializationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RdmDeserializationError::BufferTooSmall => write!(f, "buffer too small"),
            RdmDeserializationError::BufferTooBig => write!(f, "buffer too big"),
            RdmDeserializationError::CommandClassNotFound(command_class) => {
                write!(f, "command class {} not found", command_class)
            },
            RdmDeserializationError::ResponseTypeNotFound(response_type) => {
                write!(f, "response type {} is unknown", response_type)
            },
            RdmDeserializationError::WrongMessageLength(message_length) => {
                write!(f, "message length {} is incorrect", message_length)
            },
            RdmDeserializationError::WrongChecksum => write!(f, "checksum is incorrect"),
            RdmDeserializationError::WrongStartCode => write!(f, "start code is incorrect"),
            RdmDeserializationError::SourceUidIsBroadcast => write!(f, "source uid is a broadcast"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RdmDeserializationError {}

#[derive(Debug, Clone)]
pub enum RdmData {
    Request(RdmRequestData),
    Response(RdmResponseData),
}

impl RdmData {
    pub fn deserialize(buf: &[u8]) -> Result<Self, RdmDeserializationError> {
        deserialize_rdm_data(buf)
    }

    pub fn serialize(&self) -> BinaryRdmPackage {
        serialize_rdm_data(self)
    }
}

/// Deserialize a complete RDM message including start code and checksum.
pub fn deserialize_rdm_data(buffer: &[u8]) -> Result<RdmData, RdmDeserializationError> {
    let buffer_size = buffer.len();

    if buffer_size < RDM_MESSAGE_MIN_LENGTH + RDM_CHECKSUM_SIZE {
        return Err(RdmDeserializationError::BufferTooSmall);
    }

    if buffer_size > RDM_MAX_PACKAGE_SIZE {
        return Err(RdmDeserializationError::BufferTooBig);
    }

    let (message, checksum) = buffer.split_at(buffer_size - RDM_CHECKSUM_SIZE);
    if calculate_checksum(message) != u16::from_be_bytes([checksum[0], checksum[1]]) {
        return Err(RdmDeserializationError::WrongChecksum);
    }

    let view = rdm_message_layout::View::new(buffer);

    if view.start_code().read() != SC_RDM || view.sub_start_code().read() != SC_SUB_MESSAGE {
        return Err(RdmDeserializationError::WrongStartCode);
    }

    let message_length = view.message_length().read() as usize;
    if message_length != message.len() {
        return Err(RdmDeserializationError::WrongMessageLength(message_length));
    }

    let parameter_data_length = view.parameter_data_length().read() as usize;
    if parameter_data_length != message_length - RDM_MESSAGE_MIN_LENGTH {
        return Err(RdmDeserializationError::WrongMessageLength(message_length));
    }

    let parameter_data = DataPack::from_slice(&message[RDM_MESSAGE_MIN_LENGTH..])
        .map_err(|_| RdmDeserializationError::BufferTooBig)?;

    let source_uid = match PackageAddress::from_bytes(view.source_uid()) {
        PackageAddress::Device(uid) => uid,
        _ => return Err(RdmDeserializationError::SourceUidIsBroadcast),
    };
    let destination_uid = PackageAddress::from_bytes(view.destination_uid());
    let command_class_field = view.command_class().read();

    if let Ok(command_class) = RequestCommandClass::try_from(command_class_field) {
        return Ok(RdmData::Request(RdmRequestData {
            destination_uid,
            source_uid,
            transaction_number: view.transaction_number().read(),
            port_id: view.port_id_response_type().read(),
            message_count: view.message_count().read(),
            sub_device: view.sub_device().read(),
            command_class,
            parameter_id: view.parameter_id().read(),
            parameter_data,
        }));
    }

    let command_class = ResponseCommandClass::try_from(command_class_field)
        .map_err(|_| RdmDeserializationError::CommandClassNotFound(command_class_field))?;
    let response_type_field = view.port_id_response_type().read();
    let response_type = ResponseType::try_from(response_type_field)
        .map_err(|_| RdmDeserializationError::ResponseTypeNotFound(response_type_field))?;

    Ok(RdmData::Response(RdmResponseData {
        destination_uid,
        source_uid,
        transaction_number: view.transaction_number().read(),
        response_type,
        message_count: view.message_count().read(),
        sub_device: view.sub_device().read(),
        command_class,
        parameter_id: view.parameter_id().read(),
        parameter_data,
    }))
}

/// Serializes RDM data to a binary Vec, message length and checksum included.
pub fn serialize_rdm_data(rdm_data: &RdmData) -> BinaryRdmPackage {
    let mut dst = [0u8; RDM_MAX_PACKAGE_SIZE];

    let (destination_uid, source_uid, transaction_number, port_id_response_type) = match rdm_data
    {
        RdmData::Request(request) => (
            request.destination_uid,
            request.source_uid,
            request.transaction_number,
            request.port_id,
        ),
        RdmData::Response(response) => (
            response.destination_uid,
            response.source_uid,
            response.transaction_number,
            response.response_type as u8,
        ),
    };
    let (message_count, sub_device, command_class, parameter_id, parameter_data) = match rdm_data {
        RdmData::Request(request) => (
            request.message_count,
            request.sub_device,
            request.command_class as u8,
            request.parameter_id,
            &request.parameter_data,
        ),
        RdmData::Response(response) => (
            response.message_count,
            response.sub_device,
            response.command_class as u8,
            response.parameter_id,
            &response.parameter_data,
        ),
    };

    // a DataPack never exceeds 231 bytes, so this always fits into 257 bytes
    let message_length = RDM_MESSAGE_MIN_LENGTH + parameter_data.len();
    let total_package_length = message_length + RDM_CHECKSUM_SIZE;

    let mut view = rdm_message_layout::View::new(&mut dst[..total_package_length]);
    view.start_code_mut().write(SC_RDM);
    view.sub_start_code_mut().write(SC_SUB_MESSAGE);
    view.message_length_mut().write(message_length as u8);
    view.destination_uid_mut()
        .copy_from_slice(&destination_uid.to_bytes());
    view.source_uid_mut().copy_from_slice(&source_uid.to_bytes());
    view.transaction_number_mut().write(transaction_number);
    view.port_id_response_type_mut()
        .write(port_id_response_type);
    view.message_count_mut().write(message_count);
    view.sub_device_mut().write(sub_device);
    view.command_class_mut().write(command_class);
    view.parameter_id_mut().write(parameter_id);
    view.parameter_data_length_mut()
        .write(parameter_data.len() as u8);
    view.parameter_data_and_checksum_mut()[..parameter_data.len()]
        .copy_from_slice(parameter_data);

    let checksum = calculate_checksum(&dst[..message_length]);
    dst[message_length..total_package_length].copy_from_slice(&checksum.to_be_bytes());

    let mut package = BinaryRdmPackage::new();
    // total_package_length <= RDM_MAX_PACKAGE_SIZE
    let _ = package.extend_from_slice(&dst[..total_package_length]);
    package
}

/// Result of a DISC_UNIQUE_BRANCH request seen from the controller.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryOption {
    /// Nobody answered, there isn't an un-muted device in the range.
    NoDevice,
    /// Something answered but it couldn't be decoded, more than one device is in the range.
    Collision,
    /// Exactly one device answered.
    Found(UniqueIdentifier),
}

/// Builds the discovery response of `uid`: seven preamble bytes, the separator, the masked uid
/// and the masked checksum over the masked uid.
pub fn encode_discovery_response(uid: UniqueIdentifier) -> BinaryDiscoveryResponse {
    let mut frame_buffer = [PREAMBLE_BYTE; RDM_MAX_DISCOVERY_RESPONSE_SIZE];
    frame_buffer[7] = SEPARATOR_BYTE;

    let mut encoded_uid = [0u8; 12];
    encode_disc_unique(&uid.to_bytes(), &mut encoded_uid);
    let checksum = calculate_checksum(&encoded_uid);

    let mut view = discovery_response_layout::View::new(&mut frame_buffer[8..]);
    view.encoded_uid_mut().copy_from_slice(&encoded_uid);
    encode_disc_unique(&checksum.to_be_bytes(), view.encoded_checksum_mut());

    frame_buffer
}

/// Returns the responding uid if there was no collision.
pub fn deserialize_discovery_response(
    buffer: &[u8],
) -> Result<UniqueIdentifier, RdmDeserializationError> {
    let separator_index = buffer
        .iter()
        .position(|&byte| byte == SEPARATOR_BYTE)
        .ok_or(RdmDeserializationError::WrongStartCode)?;

    if buffer[..separator_index]
        .iter()
        .any(|&byte| byte != PREAMBLE_BYTE)
    {
        return Err(RdmDeserializationError::WrongStartCode);
    }

    let body = &buffer[separator_index + 1..];
    if body.len() < RDM_DISCOVERY_RESPONSE_SIZE {
        return Err(RdmDeserializationError::WrongMessageLength(body.len()));
    }

    let view = discovery_response_layout::View::new(&body[..RDM_DISCOVERY_RESPONSE_SIZE]);

    let mut uid_buffer = [0u8; 6];
    decode_disc_unique(view.encoded_uid(), &mut uid_buffer);

    let mut checksum_buffer = [0u8; 2];
    decode_disc_unique(view.encoded_checksum(), &mut checksum_buffer);

    if calculate_checksum(view.encoded_uid()) != u16::from_be_bytes(checksum_buffer) {
        return Err(RdmDeserializationError::WrongChecksum);
    }

    match PackageAddress::from_bytes(&uid_buffer) {
        PackageAddress::Device(uid) => Ok(uid),
        _ => Err(RdmDeserializationError::SourceUidIsBroadcast),
    }
}

/// Classifies whatever was captured after a DISC_UNIQUE_BRANCH request.
pub fn decode_discovery_response(buffer: Option<&[u8]>) -> DiscoveryOption {
    match buffer {
        None => DiscoveryOption::NoDevice,
        Some(buffer) => deserialize_discovery_response(buffer)
            .map_or(DiscoveryOption::Collision, DiscoveryOption::Found),
    }
}

use crate::consts::RDM_MAX_PARAMETER_DATA_LENGTH;
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};
use modular_bitfield::bitfield;
use modular_bitfield::prelude::B12;

/// Parameter data of a single RDM message.
pub type DataPack = heapless::Vec<u8, RDM_MAX_PARAMETER_DATA_LENGTH>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeserializationError;

impl core::fmt::Display for DeserializationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "There was a deserialization error.")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeserializationError {}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RequestCommandClass {
    DiscoveryCommand = 0x10,
    GetCommand = 0x20,
    SetCommand = 0x30,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseCommandClass {
    DiscoveryCommandResponse = 0x11,
    GetCommandResponse = 0x21,
    SetCommandResponse = 0x31,
}

impl RequestCommandClass {
    pub fn response_class(&self) -> ResponseCommandClass {
        match self {
            Self::DiscoveryCommand => ResponseCommandClass::DiscoveryCommandResponse,
            Self::GetCommand => ResponseCommandClass::GetCommandResponse,
            Self::SetCommand => ResponseCommandClass::SetCommandResponse,
        }
    }
}

impl TryFrom<u8> for RequestCommandClass {
    type Error = DeserializationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::DiscoveryCommand),
            0x20 => Ok(Self::GetCommand),
            0x30 => Ok(Self::SetCommand),
            _ => Err(DeserializationError),
        }
    }
}

impl TryFrom<u8> for ResponseCommandClass {
    type Error = DeserializationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x11 => Ok(Self::DiscoveryCommandResponse),
            0x21 => Ok(Self::GetCommandResponse),
            0x31 => Ok(Self::SetCommandResponse),
            _ => Err(DeserializationError),
        }
    }
}

/// Response status of an RDM message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseType {
    Ack = 0x00,
    /// The result isn't ready yet, the parameter data holds the estimated delay in 100 ms steps.
    AckTimer = 0x01,
    NackReason = 0x02,
    /// Acknowledged, but the result needs more than one response.
    AckOverflow = 0x03,
}

impl TryFrom<u8> for ResponseType {
    type Error = DeserializationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Ack,
            0x01 => Self::AckTimer,
            0x02 => Self::NackReason,
            0x03 => Self::AckOverflow,
            _ => return Err(DeserializationError),
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum NackReason {
    UnknownPid = 0x0000,
    FormatError = 0x0001,
    HardwareFault = 0x0002,
    ProxyReject = 0x0003,
    WriteProtect = 0x0004,
    UnsupportedCommandClass = 0x0005,
    DataOutOfRange = 0x0006,
    BufferFull = 0x0007,
    PacketSizeUnsupported = 0x0008,
    SubDeviceOutOfRange = 0x0009,
    ProxyBufferFull = 0x000A,
}

impl NackReason {
    pub fn serialize(&self) -> DataPack {
        let mut data_pack = DataPack::new();
        // a DataPack always has room for two bytes
        let _ = data_pack.extend_from_slice(&(*self as u16).to_be_bytes());
        data_pack
    }
}

impl TryFrom<u16> for NackReason {
    type Error = DeserializationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::UnknownPid),
            0x0001 => Ok(Self::FormatError),
            0x0002 => Ok(Self::HardwareFault),
            0x0003 => Ok(Self::ProxyReject),
            0x0004 => Ok(Self::WriteProtect),
            0x0005 => Ok(Self::UnsupportedCommandClass),
            0x0006 => Ok(Self::DataOutOfRange),
            0x0007 => Ok(Self::BufferFull),
            0x0008 => Ok(Self::PacketSizeUnsupported),
            0x0009 => Ok(Self::SubDeviceOutOfRange),
            0x000A => Ok(Self::ProxyBufferFull),
            _ => Err(DeserializationError),
        }
    }
}

/// Parameter data of a DISC_MUTE / DISC_UN_MUTE response.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryMuteResponse {
    /// The responder is a proxy device.
    pub managed_proxy: bool,
    /// The responder supports sub devices.
    pub sub_device: bool,
    /// The responder is not operational before receiving a firmware update.
    pub boot_loader: bool,
    /// A proxy device has responded on behalf of another device.
    pub proxy_device: bool,
    /// Uid of the primary port on devices with multiple responder ports.
    pub binding_uid: Option<UniqueIdentifier>,
}

#[bitfield]
struct DiscControlField {
    managed_proxy: bool,
    sub_device: bool,
    boot_loader: bool,
    proxy_device: bool,
    #[skip]
    reserved: B12,
}

impl DiscoveryMuteResponse {
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializationError> {
        let control_bytes: [u8; 2] = match data.get(..2) {
            Some(&[high, low]) => [low, high],
            _ => return Err(DeserializationError),
        };

        let control_field = DiscControlField::from_bytes(control_bytes);
        let binding_uid = match data.len() {
            2 => None,
            8 => {
                let mut uid_bytes = [0u8; 6];
                uid_bytes.copy_from_slice(&data[2..8]);
                match PackageAddress::from_bytes(&uid_bytes) {
                    PackageAddress::Device(uid) => Some(uid),
                    _ => return Err(DeserializationError),
                }
            },
            _ => return Err(DeserializationError),
        };

        Ok(Self {
            managed_proxy: control_field.managed_proxy(),
            sub_device: control_field.sub_device(),
            boot_loader: control_field.boot_loader(),
            proxy_device: control_field.proxy_device(),
            binding_uid,
        })
    }

    pub fn serialize(&self) -> DataPack {
        let control_field = DiscControlField::new()
            .with_managed_proxy(self.managed_proxy)
            .with_sub_device(self.sub_device)
            .with_boot_loader(self.boot_loader)
            .with_proxy_device(self.proxy_device)
            .into_bytes();

        let mut data_pack = DataPack::new();
        // bit 0 lives in the low byte, which goes last on the wire
        let _ = data_pack.extend_from_slice(&[control_field[1], control_field[0]]);
        if let Some(uid) = self.binding_uid {
            let _ = data_pack.extend_from_slice(&uid.to_bytes());
        }

        data_pack
    }
}

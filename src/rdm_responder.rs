use crate::consts::UID_SIZE;
use crate::dmx_port::DmxPortError;
use crate::layouts::disc_unique_branch_layout;
use crate::pids;
use crate::rdm_data::{IsBroadcastError, RdmDeserializationError, RdmRequestData, RdmResponseData};
use crate::rdm_types::{
    DataPack, DiscoveryMuteResponse, NackReason, RequestCommandClass, ResponseType,
};
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};

/// The result object of an RDM handler.
pub enum RdmResult {
    /// The package was acknowledged. The [DataPack] contains the response data.
    Acknowledged(DataPack),
    /// The package was acknowledged, but it does not fit into one [DataPack].
    /// The [DataPack] contains part of the response.
    /// If the RDM-controller requests the same pid and the rest of the message still doesn't fit
    /// into one [DataPack], send the next part as an [RdmResult::AcknowledgedOverflow].
    /// If the rest finally does fit into one [DataPack] send the rest as an [RdmResult::Acknowledged].
    AcknowledgedOverflow(DataPack),
    /// The message was not acknowledged. The [u16] is the [NackReason].
    NotAcknowledged(u16),
    /// The message was acknowledged but a result can not be delivered immediately. The [u16]
    /// contains the amount of time the controller has to wait in 100ms steps.
    AcknowledgedTimer(u16),
    /// The receiver does not respond with anything.
    NoResponse,
    /// A custom response.
    Custom(RdmResponseData),
}

/// A context object for accessing the state of a [RdmResponder] from a [RdmResponderHandlerFunc].
pub struct RdmResponderContext<'a> {
    pub uid: UniqueIdentifier,
    /// true if the device won't respond to discovery requests.
    pub discovery_muted: &'a mut bool,
}

/// A handler for the rdm packages the [RdmResponder] doesn't handle itself.
pub trait RdmResponderHandlerFunc {
    type Error;

    /// Handle rdm requests that aren't handled by the [RdmResponder] itself.
    fn handle_rdm(
        &mut self,
        _request: &RdmRequestData,
        _context: &mut RdmResponderContext,
    ) -> Result<RdmResult, Self::Error> {
        Ok(RdmResult::NotAcknowledged(NackReason::UnknownPid as u16))
    }
}

#[derive(Debug)]
pub enum RdmAnswer {
    /// Has to be sent with an uart break
    Response(RdmResponseData),
    /// Has to be sent without an uart break
    DiscoveryResponse(UniqueIdentifier),
    /// No response to send
    NoResponse,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors that can happen during polling. These errors should not cause panics.
pub enum PollingError<HandlerError> {
    /// The received package is a response and not a request.
    NotMatching,
    /// The answer couldn't be sent.
    PortError(DmxPortError),
    /// A handler specific error occurred.
    HandlerError(HandlerError),
    /// Raised when an RDM package could not be deserialized.
    DeserializationError(RdmDeserializationError),
}

impl<HandlerError: core::fmt::Display> core::fmt::Display for PollingError<HandlerError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let error_message = match self {
            PollingError::NotMatching => "Received response and not request.",
            PollingError::DeserializationError(_) => "Deserialization error.",
            PollingError::PortError(error) => {
                return core::fmt::Display::fmt(error, f);
            },
            PollingError::HandlerError(error) => {
                return core::fmt::Display::fmt(error, f);
            },
        };

        write!(f, "{}", error_message)
    }
}

#[cfg(feature = "std")]
impl<HandlerError: core::fmt::Display + core::fmt::Debug> std::error::Error
    for PollingError<HandlerError>
{
}

impl<HandlerError> From<DmxPortError> for PollingError<HandlerError> {
    fn from(value: DmxPortError) -> Self {
        Self::PortError(value)
    }
}

macro_rules! build_nack {
    ($responder:expr, $request:expr, $nack_reason:expr) => {
        $request.build_response(
            $responder.uid,
            ResponseType::NackReason,
            $nack_reason.serialize(),
            0,
        )
    };
}

pub struct RdmResponderConfig {
    /// The unique id that is used as a source id in the packages.
    pub uid: UniqueIdentifier,
    /// Flags reported in the DISC_MUTE and DISC_UN_MUTE responses.
    pub control_field: DiscoveryMuteResponse,
}

impl RdmResponderConfig {
    pub fn new(uid: UniqueIdentifier) -> Self {
        Self {
            uid,
            control_field: DiscoveryMuteResponse::default(),
        }
    }
}

/// Answers discovery and mute requests, everything else goes to a [RdmResponderHandlerFunc].
pub struct RdmResponder {
    uid: UniqueIdentifier,
    control_field: DiscoveryMuteResponse,
    discovery_muted: bool,
}

impl RdmResponder {
    /// Creates a new [RdmResponder].
    pub fn new(config: RdmResponderConfig) -> Self {
        Self {
            uid: config.uid,
            control_field: config.control_field,
            discovery_muted: false,
        }
    }

    /// Get the uid of the rdm responder.
    pub fn get_uid(&self) -> UniqueIdentifier {
        self.uid
    }

    pub fn is_discovery_muted(&self) -> bool {
        self.discovery_muted
    }

    pub fn handle_rdm_request<HandlerError>(
        &mut self,
        request: RdmRequestData,
        handler: &mut dyn RdmResponderHandlerFunc<Error = HandlerError>,
    ) -> Result<RdmAnswer, HandlerError> {
        if !request.destination_uid.addresses(self.uid) {
            return Ok(RdmAnswer::NoResponse);
        }

        if request.command_class == RequestCommandClass::DiscoveryCommand
            && ![
                pids::DISC_UNIQUE_BRANCH,
                pids::DISC_MUTE,
                pids::DISC_UN_MUTE,
            ]
            .contains(&request.parameter_id)
        {
            return Ok(RdmAnswer::NoResponse);
        }

        let response = match request.parameter_id {
            pids::DISC_UNIQUE_BRANCH => return Ok(self.handle_disc_unique_branch(&request)),
            pids::DISC_MUTE => self.handle_disc_mute(&request, true),
            pids::DISC_UN_MUTE => self.handle_disc_mute(&request, false),
            _ => {
                let mut context = RdmResponderContext {
                    uid: self.uid,
                    discovery_muted: &mut self.discovery_muted,
                };

                match handler.handle_rdm(&request, &mut context)? {
                    RdmResult::Acknowledged(response_data) => {
                        request.build_response(self.uid, ResponseType::Ack, response_data, 0)
                    },
                    RdmResult::AcknowledgedOverflow(response_data) => request.build_response(
                        self.uid,
                        ResponseType::AckOverflow,
                        response_data,
                        0,
                    ),
                    RdmResult::NotAcknowledged(nack_reason) => request.build_response(
                        self.uid,
                        ResponseType::NackReason,
                        u16_data_pack(nack_reason),
                        0,
                    ),
                    RdmResult::AcknowledgedTimer(timer) => request.build_response(
                        self.uid,
                        ResponseType::AckTimer,
                        u16_data_pack(timer),
                        0,
                    ),
                    RdmResult::NoResponse => {
                        return Ok(RdmAnswer::NoResponse);
                    },
                    RdmResult::Custom(response_data) => Ok(response_data),
                }
                .ok()
            },
        };

        // Was this a broadcast?
        if let Some(response_data) = response {
            return Ok(RdmAnswer::Response(response_data));
        }

        // No response since the request is a broadcast
        Ok(RdmAnswer::NoResponse)
    }

    fn handle_disc_unique_branch(&self, request: &RdmRequestData) -> RdmAnswer {
        if request.command_class != RequestCommandClass::DiscoveryCommand {
            return match build_nack!(self, request, NackReason::UnsupportedCommandClass) {
                Ok(response) => RdmAnswer::Response(response),
                Err(_) => RdmAnswer::NoResponse,
            };
        }

        if request.parameter_data.len() != 2 * UID_SIZE {
            return RdmAnswer::NoResponse;
        }

        let view = disc_unique_branch_layout::View::new(&request.parameter_data[..]);
        let lower_bound: u64 = PackageAddress::from_bytes(view.lower_bound_uid()).into();
        let upper_bound: u64 = PackageAddress::from_bytes(view.upper_bound_uid()).into();

        if !self.discovery_muted && self.uid.is_within(lower_bound, upper_bound) {
            return RdmAnswer::DiscoveryResponse(self.uid);
        }

        RdmAnswer::NoResponse
    }

    fn handle_disc_mute(&mut self, request: &RdmRequestData, mute: bool) -> Option<RdmResponseData> {
        if request.command_class != RequestCommandClass::DiscoveryCommand {
            return build_nack!(self, request, NackReason::UnsupportedCommandClass).ok();
        }

        if !request.parameter_data.is_empty() {
            return None;
        }

        self.discovery_muted = mute;
        self.build_disc_mute_response(request).ok()
    }

    fn build_disc_mute_response(
        &self,
        request: &RdmRequestData,
    ) -> Result<RdmResponseData, IsBroadcastError> {
        request.build_response(
            self.uid,
            ResponseType::Ack,
            self.control_field.serialize(),
            0,
        )
    }
}

fn u16_data_pack(value: u16) -> DataPack {
    let mut data_pack = DataPack::new();
    // two bytes always fit
    let _ = data_pack.extend_from_slice(&value.to_be_bytes());
    data_pack
}

pub const DMX_NULL_START: u8 = 0x00;
/// Highest slot number of a DMX512 frame, the start code not included.
pub const DMX_MAX_SLOTS: usize = 512;
/// start code + 512 byte package
pub const DMX_MAX_PACKAGE_SIZE: usize = DMX_MAX_SLOTS + 1;
pub const SC_RDM: u8 = 0xCC;
pub const SC_SUB_MESSAGE: u8 = 0x01;

pub const PREAMBLE_BYTE: u8 = 0xFE;
pub const SEPARATOR_BYTE: u8 = 0xAA;
pub const DISCOVERY_PREAMBLE_MAX_LENGTH: usize = 7;

pub const BROADCAST_UID: u64 = 0xFFFF_FFFFFFFF;
pub const UID_SIZE: usize = 6;

/// One slot on the wire: start bit, 8 data bits and 2 stop bits at 4 µs each.
pub const SLOT_TIME_MICROS: u32 = 44;

pub const TRANSMIT_BREAK_TIME_MIN_MICROS: u32 = 92;
pub const TRANSMIT_BREAK_TIME_TYPICAL_MICROS: u32 = 176;
pub const TRANSMIT_BREAK_TIME_MAX_MICROS: u32 = 1_000_000;
pub const TRANSMIT_MAB_TIME_MIN_MICROS: u32 = 12;
pub const TRANSMIT_MAB_TIME_TYPICAL_MICROS: u32 = 16;
pub const TRANSMIT_MAB_TIME_MAX_MICROS: u32 = 1_000_000;
pub const TRANSMIT_REFRESH_RATE_DEFAULT_HZ: u32 = 40;
pub const TRANSMIT_PERIOD_DEFAULT_MICROS: u32 = 1_000_000 / TRANSMIT_REFRESH_RATE_DEFAULT_HZ;
pub const TRANSMIT_BREAK_TO_BREAK_TIME_MIN_MICROS: u32 = 1204;

/// Added on top of the observed slot interval before a short frame is closed.
pub const RECEIVE_SLOT_TIMEOUT_GUARD_MICROS: u32 = 12;

pub const RDM_TRANSMIT_BREAK_TIME_MICROS: u32 = 176;
pub const RDM_TRANSMIT_MAB_TIME_MICROS: u32 = 12;
/// Min 176 µs, max 2 ms.
pub const RDM_RESPONDER_PACKET_SPACING_MICROS: u32 = 200;

pub const HOUSEKEEPING_PERIOD_MICROS: u32 = 1_000_000;

/// Without the checksum.
pub const RDM_MESSAGE_MIN_LENGTH: usize = 24;
pub const RDM_CHECKSUM_SIZE: usize = 2;
pub const RDM_MAX_PACKAGE_SIZE: usize = 257;
/// Excluding preamble and separator
pub const RDM_DISCOVERY_RESPONSE_SIZE: usize = 16;
/// Including 7 bytes preamble + 1 byte separator
pub const RDM_MAX_DISCOVERY_RESPONSE_SIZE: usize = RDM_DISCOVERY_RESPONSE_SIZE + 8;

pub const RDM_MAX_PARAMETER_DATA_LENGTH: usize = 231;

/// Default amount of slots in the RDM receive ring.
pub const RDM_RING_DEFAULT_ENTRIES: usize = 16;

/// Upper bound of independent DMX consumers, one acknowledge bit each.
pub const DMX_MAX_CONSUMERS: u8 = 8;

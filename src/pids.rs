//! Parameter ids from ANSI E1.20 that the transceiver looks at.

pub const DISC_UNIQUE_BRANCH: u16 = 0x0001;
pub const DISC_MUTE: u16 = 0x0002;
pub const DISC_UN_MUTE: u16 = 0x0003;
pub const IDENTIFY_DEVICE: u16 = 0x1000;

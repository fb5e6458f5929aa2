use crate::consts::{BROADCAST_UID, UID_SIZE};
use crate::rdm_types::DeserializationError;

/// The 48 bit RDM identifier of a responder or controller: 16 bit manufacturer id followed by a
/// 32 bit device id. The all-ones device id is reserved for broadcasts and can't be represented.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniqueIdentifier {
    manufacturer_uid: u16,
    device_uid: u32,
}

impl core::fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04X}:{:08X}", self.manufacturer_uid, self.device_uid)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UniqueIdentifier {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:04X}:{:08X}", self.manufacturer_uid, self.device_uid);
    }
}

impl Ord for UniqueIdentifier {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        u64::from(*self).cmp(&u64::from(*other))
    }
}

impl PartialOrd for UniqueIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl UniqueIdentifier {
    pub fn new(manufacturer_uid: u16, device_uid: u32) -> Result<Self, DeserializationError> {
        if device_uid == u32::MAX || manufacturer_uid == u16::MAX {
            return Err(DeserializationError);
        }

        Ok(UniqueIdentifier {
            manufacturer_uid,
            device_uid,
        })
    }

    pub fn manufacturer_uid(&self) -> u16 {
        self.manufacturer_uid
    }

    pub fn device_uid(&self) -> u32 {
        self.device_uid
    }

    pub fn to_bytes(&self) -> [u8; UID_SIZE] {
        let mut buffer = [0u8; UID_SIZE];

        buffer[..2].copy_from_slice(&self.manufacturer_uid.to_be_bytes());
        buffer[2..].copy_from_slice(&self.device_uid.to_be_bytes());

        buffer
    }

    /// Is this uid inside the inclusive range used by DISC_UNIQUE_BRANCH?
    pub fn is_within(&self, lower_bound: u64, upper_bound: u64) -> bool {
        (lower_bound..=upper_bound).contains(&u64::from(*self))
    }
}

impl TryFrom<u64> for UniqueIdentifier {
    type Error = DeserializationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > BROADCAST_UID {
            return Err(DeserializationError);
        }

        Self::new((value >> u32::BITS) as u16, value as u32)
    }
}

impl From<UniqueIdentifier> for u64 {
    fn from(value: UniqueIdentifier) -> Self {
        ((value.manufacturer_uid as u64) << u32::BITS) | value.device_uid as u64
    }
}

/// Destination of an RDM message.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PackageAddress {
    /// Broadcast to all devices.
    Broadcast,
    /// Broadcast to all devices of the manufacturer in the u16.
    ManufacturerBroadcast(u16),
    /// A single device.
    Device(UniqueIdentifier),
}

impl PackageAddress {
    pub fn from_bytes(buffer: &[u8; UID_SIZE]) -> Self {
        let manufacturer_uid = u16::from_be_bytes([buffer[0], buffer[1]]);
        let device_uid = u32::from_be_bytes([buffer[2], buffer[3], buffer[4], buffer[5]]);

        match (manufacturer_uid, device_uid) {
            (u16::MAX, u32::MAX) => Self::Broadcast,
            (manufacturer_uid, u32::MAX) => Self::ManufacturerBroadcast(manufacturer_uid),
            (manufacturer_uid, device_uid) => Self::Device(UniqueIdentifier {
                manufacturer_uid,
                device_uid,
            }),
        }
    }

    pub fn to_bytes(&self) -> [u8; UID_SIZE] {
        match self {
            Self::Broadcast => [0xFFu8; UID_SIZE],
            Self::ManufacturerBroadcast(manufacturer_uid) => {
                let mut buffer = [0xFFu8; UID_SIZE];
                buffer[..2].copy_from_slice(&manufacturer_uid.to_be_bytes());

                buffer
            },
            Self::Device(uid) => uid.to_bytes(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        !matches!(self, PackageAddress::Device(_))
    }

    /// Does a message sent to this address concern the device `uid`?
    pub fn addresses(&self, uid: UniqueIdentifier) -> bool {
        match self {
            PackageAddress::Broadcast => true,
            PackageAddress::ManufacturerBroadcast(manufacturer_uid) => {
                *manufacturer_uid == uid.manufacturer_uid()
            },
            PackageAddress::Device(device_uid) => *device_uid == uid,
        }
    }
}

impl From<PackageAddress> for u64 {
    fn from(value: PackageAddress) -> Self {
        match value {
            PackageAddress::Broadcast => BROADCAST_UID,
            PackageAddress::ManufacturerBroadcast(manufacturer_uid) => {
                ((manufacturer_uid as u64) << u32::BITS) | u32::MAX as u64
            },
            PackageAddress::Device(uid) => uid.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_bytes() {
        let uid = UniqueIdentifier::new(0x7FF0, 0x0000_0102).unwrap();
        assert_eq!(uid.to_bytes(), [0x7F, 0xF0, 0x00, 0x00, 0x01, 0x02]);
        assert_eq!(
            PackageAddress::from_bytes(&uid.to_bytes()),
            PackageAddress::Device(uid)
        );
        assert_eq!(
            PackageAddress::from_bytes(&[0xFF; 6]),
            PackageAddress::Broadcast
        );
        assert_eq!(
            PackageAddress::from_bytes(&[0x7F, 0xF0, 0xFF, 0xFF, 0xFF, 0xFF]),
            PackageAddress::ManufacturerBroadcast(0x7FF0)
        );
    }

    #[test]
    fn test_addresses() {
        let uid = UniqueIdentifier::new(0x7FF0, 7).unwrap();
        let other = UniqueIdentifier::new(0x7FF1, 7).unwrap();

        assert!(PackageAddress::Broadcast.addresses(uid));
        assert!(PackageAddress::ManufacturerBroadcast(0x7FF0).addresses(uid));
        assert!(!PackageAddress::ManufacturerBroadcast(0x7FF0).addresses(other));
        assert!(PackageAddress::Device(uid).addresses(uid));
        assert!(!PackageAddress::Device(other).addresses(uid));
    }

    #[test]
    fn test_uid_ordering_and_range() {
        let low = UniqueIdentifier::new(0x0001, u32::MAX - 1).unwrap();
        let high = UniqueIdentifier::new(0x0002, 0).unwrap();
        assert!(low < high);
        assert!(high.is_within(0x0001_0000_0000, 0x0002_0000_0000));
        assert!(!high.is_within(0x0002_0000_0001, BROADCAST_UID));
        assert!(UniqueIdentifier::try_from(BROADCAST_UID).is_err());
        assert_eq!(
            UniqueIdentifier::try_from(0x7FF0_0000_0001).unwrap(),
            UniqueIdentifier::new(0x7FF0, 1).unwrap()
        );
    }
}

/// 16 bit wrapping sum used by RDM messages and discovery responses.
#[inline]
pub(crate) fn calculate_checksum(data: &[u8]) -> u16 {
    let mut checksum = 0u16;

    for byte in data {
        checksum = checksum.wrapping_add(*byte as u16);
    }

    checksum
}

/// Encodes every byte into two bytes, `byte | 0xAA` followed by `byte | 0x55`.
/// The destination has to be at least twice the source size.
pub(crate) fn encode_disc_unique(src: &[u8], dest: &mut [u8]) {
    for (byte, chunk) in src.iter().zip(dest.chunks_mut(2)) {
        if let [even, odd] = chunk {
            *even = byte | 0xAA;
            *odd = byte | 0x55;
        }
    }
}

/// Reverses [encode_disc_unique]. Trailing odd bytes of the source are ignored.
pub(crate) fn decode_disc_unique(src: &[u8], dest: &mut [u8]) {
    for (chunk, byte) in src.chunks_exact(2).zip(dest.iter_mut()) {
        *byte = chunk[0] & chunk[1];
    }
}

/// Microseconds from `since` to `now` on a wrapping 32 bit counter.
#[inline]
pub(crate) fn elapsed_micros(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Microseconds still to wait until `spacing` has passed since `since`. Never negative.
#[inline]
pub fn remaining_micros(now: u32, since: u32, spacing: u32) -> u32 {
    spacing.saturating_sub(elapsed_micros(now, since))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(calculate_checksum(&[]), 0);
        assert_eq!(calculate_checksum(&[0xCC, 0x01, 0x18]), 0xE5);
        assert_eq!(calculate_checksum(&[0xFF; 300]), (0xFFu32 * 300) as u16);
    }

    #[test]
    fn test_disc_unique_encoding() {
        let mut encoded = [0u8; 4];
        encode_disc_unique(&[0x12, 0xF0], &mut encoded);
        assert_eq!(encoded, [0xBA, 0x57, 0xFA, 0xF5]);

        let mut decoded = [0u8; 2];
        decode_disc_unique(&encoded, &mut decoded);
        assert_eq!(decoded, [0x12, 0xF0]);
    }

    #[test]
    fn test_remaining_micros_across_wrap() {
        assert_eq!(remaining_micros(100, 0, 200), 100);
        assert_eq!(remaining_micros(500, 0, 200), 0);
        assert_eq!(remaining_micros(50, u32::MAX - 49, 200), 100);
    }
}

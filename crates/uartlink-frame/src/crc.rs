/// Reflected form of the CCITT polynomial 0x1021.
const POLY: u16 = 0x8408;

/// Feed `data` into a running CRC-16/KERMIT accumulator.
///
/// Start with `0`; the final value is used as is (no xor-out) and sent
/// little-endian.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// CRC-16/KERMIT of a complete buffer.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kermit_check_value() {
        assert_eq!(crc16(b"123456789"), 0x2189);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"\x01\x00\x00\x00\x05\x00\x00\x00hello";
        let mut acc = 0;
        for chunk in data.chunks(3) {
            acc = crc16_update(acc, chunk);
        }
        assert_eq!(acc, crc16(data));
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let data = *b"\x01\x00\x00\x00\x00\x00\x00\x00";
        let good = crc16(&data);
        for bit in 0..data.len() * 8 {
            let mut flipped = data;
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(crc16(&flipped), good, "bit {bit} went undetected");
        }
    }
}

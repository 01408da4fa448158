//! CRC-16/CCITT-FALSE as required by the BR Code (EMV QR) checksum field.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Computes the raw 16-bit checksum over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = INITIAL;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }

    crc
}

/// Checksum rendered the way it is embedded in a payload: four uppercase,
/// zero-padded hex digits.
pub fn crc16_hex(text: &str) -> String {
    format!("{:04X}", crc16(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ccitt_false_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16_hex("123456789"), "29B1");
    }

    #[test]
    fn empty_input_yields_initial_value() {
        assert_eq!(crc16_hex(""), "FFFF");
    }

    #[test]
    fn pads_to_four_uppercase_digits() {
        let hex = crc16_hex("A");
        assert_eq!(hex, "B915");
        assert_eq!(hex.len(), 4);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn matches_central_bank_reference_payload() {
        let payload = "00020126580014br.gov.bcb.pix0136123e4567-e12b-12d1-a456-4266554400005204000053039865802BR5913Fulano de Tal6008BRASILIA62070503***6304";
        assert_eq!(crc16_hex(payload), "1D3D");
    }

    #[test]
    fn is_deterministic() {
        let input = "00020126400014br.gov.bcb.pix";
        assert_eq!(crc16_hex(input), crc16_hex(input));
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let samples: [&[u8]; 4] = [b"123456789", b"000201", b"SAO PAULO", b"order-42"];

        for sample in samples {
            let original = crc16(sample);
            for index in 0..sample.len() {
                for bit in 0..8 {
                    let mut flipped = sample.to_vec();
                    flipped[index] ^= 1 << bit;
                    assert_ne!(
                        crc16(&flipped),
                        original,
                        "flip of bit {} in byte {} went undetected",
                        bit,
                        index
                    );
                }
            }
        }
    }
}

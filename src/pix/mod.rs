//! BR Code (PIX "copia e cola") checksum and TLV codec.

pub mod crc;
pub mod payload;
pub mod tlv;

pub use crc::{crc16, crc16_hex};
pub use payload::{decode, encode, format_amount, verify_checksum, BrCode, DecodedBrCode, PixCodeError};

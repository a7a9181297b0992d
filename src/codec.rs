//! Primitive byte decoding shared by every response and frame decoder.
//!
//! Telemetry fields arrive least-significant byte first. Flash addresses are the one
//! place the protocol uses big-endian ordering.

use crate::errors::{DriverError, Result};

/// Bit pattern the controllers use for "no data" / erased flash in a float field.
pub const FLOAT_NO_DATA: [u8; 4] = [0xFF; 4];

/// Largest address expressible in the 3-byte flash address field.
pub const MAX_FLASH_ADDRESS: u32 = 0x00FF_FFFF;

/// Byte order of a multi-byte integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first (sensor and telemetry fields).
    #[default]
    Little,
    /// Most significant byte first (flash addresses).
    Big,
}

/// Combine 1-4 bytes into an unsigned integer.
pub fn bytes_to_uint(bytes: &[u8], order: ByteOrder) -> Result<u32> {
    if bytes.is_empty() {
        return Err(DriverError::Decode("cannot decode an integer from zero bytes".into()));
    }
    if bytes.len() > 4 {
        return Err(DriverError::Decode(format!(
            "integer fields are at most 4 bytes wide, got {}",
            bytes.len()
        )));
    }

    let value = match order {
        ByteOrder::Little => bytes
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (8 * i))),
        ByteOrder::Big => bytes
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
    };
    Ok(value)
}

/// Reinterpret 4 little-endian bytes as an IEEE-754 single.
///
/// The all-`0xFF` pattern is the controllers' "no data" marker and decodes to `0.0`.
/// Every other pattern, NaN encodings included, decodes normally.
pub fn bytes_to_f32(bytes: &[u8]) -> Result<f32> {
    let raw: [u8; 4] = bytes.try_into().map_err(|_| {
        DriverError::Decode(format!("float fields are 4 bytes, got {}", bytes.len()))
    })?;
    if raw == FLOAT_NO_DATA {
        return Ok(0.0);
    }
    Ok(f32::from_le_bytes(raw))
}

/// Extract bit `index` of `value` as 0 or 1.
#[inline]
pub fn get_bit(value: u8, index: u8) -> u8 {
    (value >> index) & 0x01
}

/// Encode a flash address as the 3-byte big-endian wire field.
pub fn encode_address(address: u32) -> Result<[u8; 3]> {
    if address > MAX_FLASH_ADDRESS {
        return Err(DriverError::InvalidArgument(format!(
            "flash address {address:#X} does not fit in 24 bits"
        )));
    }
    let [_, hi, mid, lo] = address.to_be_bytes();
    Ok([hi, mid, lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_roundtrip_for_each_width() {
        let samples: [(u32, usize); 4] = [(0xAB, 1), (0xBEEF, 2), (0x12_3456, 3), (0xDEAD_BEEF, 4)];
        for (value, width) in samples {
            let bytes = &value.to_le_bytes()[..width];
            assert_eq!(bytes_to_uint(bytes, ByteOrder::Little).unwrap(), value);
        }
    }

    #[test]
    fn big_endian_matches_address_layout() {
        assert_eq!(bytes_to_uint(&[0x01, 0x02, 0x03], ByteOrder::Big).unwrap(), 0x010203);
        assert_eq!(encode_address(0x010203).unwrap(), [0x01, 0x02, 0x03]);
    }

    #[test]
    fn empty_and_oversized_integers_fail() {
        assert!(matches!(bytes_to_uint(&[], ByteOrder::Little), Err(DriverError::Decode(_))));
        assert!(matches!(bytes_to_uint(&[0; 5], ByteOrder::Little), Err(DriverError::Decode(_))));
    }

    #[test]
    fn float_sentinel_decodes_to_zero() {
        assert_eq!(bytes_to_f32(&FLOAT_NO_DATA).unwrap(), 0.0);
        assert_eq!(bytes_to_f32(&101.3f32.to_le_bytes()).unwrap(), 101.3);
    }

    #[test]
    fn other_nan_patterns_still_decode_as_nan() {
        assert!(bytes_to_f32(&[0x00, 0x00, 0xC0, 0x7F]).unwrap().is_nan());
        assert!(bytes_to_f32(&[0xFE, 0xFF, 0xFF, 0xFF]).unwrap().is_nan());
    }

    #[test]
    fn float_requires_exactly_four_bytes() {
        assert!(matches!(bytes_to_f32(&[0; 3]), Err(DriverError::Decode(_))));
        assert!(matches!(bytes_to_f32(&[0; 5]), Err(DriverError::Decode(_))));
    }

    #[test]
    fn address_wider_than_24_bits_is_rejected() {
        assert!(encode_address(MAX_FLASH_ADDRESS).is_ok());
        assert!(matches!(encode_address(0x0100_0000), Err(DriverError::InvalidArgument(_))));
    }
}

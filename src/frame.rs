//! Flash frame decoding.
//!
//! A frame is one logged sample: a 4-byte little-endian millisecond counter followed by
//! every sensor field of the controller, in profile order.
//!
//! ```text
//! +----------+----------+----------+-----+----------+
//! | time(4)  | sensor 0 | sensor 1 | ... | sensor N |
//! +----------+----------+----------+-----+----------+
//! ```

use crate::codec::{self, ByteOrder};
use crate::controller::{ControllerProfile, TIMESTAMP_SIZE};
use crate::conversions;
use crate::errors::{DriverError, Result};
use crate::readout::{self, ConvertedReadout};

/// One decoded flash frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    /// Seconds since the controller started logging.
    pub time: f64,
    /// Physical values in profile key order.
    pub values: Vec<f64>,
}

impl SensorFrame {
    /// `[time, values...]`, the layout written to export files.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.values.len() + 1);
        row.push(self.time);
        row.extend_from_slice(&self.values);
        row
    }

    /// Number of fields including the timestamp.
    pub fn field_count(&self) -> usize {
        self.values.len() + 1
    }
}

/// Output flavour of [`parse_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Timestamp in seconds plus converted sensor values.
    #[default]
    Converted,
    /// The block bytes as integers, no decoding at all (diagnostics).
    RawBytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrames {
    Converted(Vec<SensorFrame>),
    RawBytes(Vec<Vec<u8>>),
}

impl ParsedFrames {
    pub fn len(&self) -> usize {
        match self {
            ParsedFrames::Converted(frames) => frames.len(),
            ParsedFrames::RawBytes(blocks) => blocks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_block_size(profile: &ControllerProfile, block: &[u8]) -> Result<()> {
    if block.len() < profile.frame_size {
        return Err(DriverError::BufferTooShort {
            needed: profile.frame_size,
            available: block.len(),
        });
    }
    if block.len() > profile.frame_size {
        return Err(DriverError::Decode(format!(
            "frame block has {} bytes, {} frames are {} bytes",
            block.len(),
            profile.name,
            profile.frame_size
        )));
    }
    Ok(())
}

/// Decode one frame block of exactly `profile.frame_size` bytes.
pub fn decode_frame(profile: &ControllerProfile, block: &[u8]) -> Result<SensorFrame> {
    check_block_size(profile, block)?;

    let millis = codec::bytes_to_uint(&block[..TIMESTAMP_SIZE], ByteOrder::Little)?;
    let keys: Vec<&str> = profile.sensor_keys().collect();
    let readout: ConvertedReadout =
        readout::decode_readouts(profile, &keys, &block[TIMESTAMP_SIZE..])?;

    Ok(SensorFrame {
        time: conversions::time_millis_to_sec(f64::from(millis)),
        values: readout.values().collect(),
    })
}

/// Decode a sequence of frame blocks, preserving their order.
pub fn parse_frames<B: AsRef<[u8]>>(
    profile: &ControllerProfile,
    blocks: &[B],
    mode: FrameMode,
) -> Result<ParsedFrames> {
    match mode {
        FrameMode::Converted => blocks
            .iter()
            .map(|b| decode_frame(profile, b.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(ParsedFrames::Converted),
        FrameMode::RawBytes => blocks
            .iter()
            .map(|b| {
                let block = b.as_ref();
                check_block_size(profile, block).map(|_| block.to_vec())
            })
            .collect::<Result<Vec<_>>>()
            .map(ParsedFrames::RawBytes),
    }
}

/// Convenience for the common converted path.
pub fn parse_converted<B: AsRef<[u8]>>(
    profile: &ControllerProfile,
    blocks: &[B],
) -> Result<Vec<SensorFrame>> {
    blocks.iter().map(|b| decode_frame(profile, b.as_ref())).collect()
}

/// Split a contiguous dump into whole frame blocks. Trailing bytes that do not fill a
/// frame are padding and are dropped.
pub fn split_blocks<'a>(profile: &ControllerProfile, dump: &'a [u8]) -> Vec<&'a [u8]> {
    dump.chunks_exact(profile.frame_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::lookup;

    fn lite_block(millis: u32, pres: f32, temp: f32) -> Vec<u8> {
        let mut block = millis.to_le_bytes().to_vec();
        block.extend_from_slice(&pres.to_le_bytes());
        block.extend_from_slice(&temp.to_le_bytes());
        block
    }

    #[test]
    fn timestamp_is_converted_to_seconds() {
        let lite = lookup(0x04).unwrap();
        let frame = decode_frame(lite, &lite_block(2_500, 98_000.0, 21.0)).unwrap();
        assert_eq!(frame.time, 2.5);
        assert_eq!(frame.values, vec![98.0, 21.0]);
        assert_eq!(frame.to_row(), vec![2.5, 98.0, 21.0]);
    }

    #[test]
    fn erased_flash_decodes_to_zero_floats() {
        let lite = lookup(0x04).unwrap();
        let frame = decode_frame(lite, &[0xFF; 12]).unwrap();
        assert_eq!(frame.time, f64::from(u32::MAX) / 1000.0);
        assert_eq!(frame.values, vec![0.0, 0.0]);
    }

    #[test]
    fn block_size_must_match_profile() {
        let lite = lookup(0x04).unwrap();
        assert!(matches!(
            decode_frame(lite, &[0u8; 11]),
            Err(DriverError::BufferTooShort { needed: 12, available: 11 })
        ));
        assert!(matches!(decode_frame(lite, &[0u8; 13]), Err(DriverError::Decode(_))));
    }

    #[test]
    fn raw_mode_returns_block_bytes() {
        let lite = lookup(0x04).unwrap();
        let blocks = vec![lite_block(1, 1.0, 2.0), lite_block(2, 3.0, 4.0)];
        match parse_frames(lite, &blocks, FrameMode::RawBytes).unwrap() {
            ParsedFrames::RawBytes(raw) => assert_eq!(raw, blocks),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn split_drops_padding() {
        let lite = lookup(0x04).unwrap();
        let dump = vec![0u8; 12 * 3 + 5];
        assert_eq!(split_blocks(lite, &dump).len(), 3);
    }
}

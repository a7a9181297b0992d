//! Ground terminal driver for the Zenith avionics flight computer family.
//!
//! The crate talks to a flight computer over a serial link using a small opcode
//! protocol, and decodes the fixed-layout binary frames those computers log to flash.
//!
//! # Layers
//!
//! - [`codec`]: little-endian integer and float decoding, 3-byte flash addresses.
//! - [`controller`]: per-board sensor layouts and calibration.
//! - [`readout`] / [`frame`]: bytes to physical values, one readout or a whole dump.
//! - [`filter`]: cut the erased tail off a flash extract.
//! - [`protocol`]: command encoding and response decoding.
//! - [`device`]: a [`ZavDevice`] session running exchanges over a [`Transport`].
//! - [`export`]: the tab-separated files other tooling reads.
//!
//! Decoding never touches the transport, so recorded dumps can be processed offline:
//!
//! ```
//! use zav_terminal::{controller, frame, filter};
//!
//! let lite = controller::lookup(0x04).unwrap();
//! let dump = vec![0xFF; lite.frame_size * 8];
//! let blocks = frame::split_blocks(lite, &dump);
//! let frames = frame::parse_converted(lite, &blocks).unwrap();
//! assert_eq!(frames.len(), 8);
//! assert!(filter::valid_prefix(&frames).is_none());
//! ```

pub mod codec;
pub mod controller;
pub mod conversions;
pub mod device;
pub mod errors;
pub mod export;
pub mod filter;
pub mod frame;
pub mod logging;
pub mod protocol;
pub mod readout;
pub mod transport;

#[cfg(feature = "python")]
mod python;

pub use controller::{ControllerProfile, Firmware};
pub use device::{ConnectionState, DualDeployExtract, FlashExtract, PingResponse, ZavDevice};
pub use errors::*;
pub use frame::{FrameMode, ParsedFrames, SensorFrame};
pub use readout::{ConvertedReadout, RawReadout};
pub use transport::{SerialConfig, Transport};

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("export file error: {0}")]
    Csv(#[from] csv::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("buffer too short: needed {needed} bytes, got {available}")]
    BufferTooShort { needed: usize, available: usize },
    #[error("unknown controller identification code {0:#04X}")]
    UnknownController(u8),
    #[error("unknown firmware id {0:#04X}")]
    UnknownFirmware(u8),
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
    #[error("no response received from controller ({0})")]
    NoResponse(&'static str),
    #[error("unrecognized {command} response byte {byte:#04X}")]
    UnrecognizedResponse { command: &'static str, byte: u8 },
    #[error("precondition not met: {0}")]
    ProtocolPrecondition(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

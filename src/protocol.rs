//! Command encoding and response decoding for the flight computer serial protocol.
//!
//! Every request is a one-byte opcode, optionally a one-byte sub-opcode, and a fixed
//! payload. Responses are command specific; an empty read (transport timeout) is always
//! reported as [`DriverError::NoResponse`], a byte outside the command's known set as
//! [`DriverError::UnrecognizedResponse`].

use std::fmt;

use crate::codec::{self, ByteOrder};
use crate::errors::{DriverError, Result};

// ============================================================================
// Opcodes
// ============================================================================

pub const OP_PING: u8 = 0x01;
pub const OP_CONNECT: u8 = 0x02;
pub const OP_IGNITE: u8 = 0x03;
pub const OP_FLASH: u8 = 0x04;
pub const OP_SENSOR: u8 = 0x05;
pub const OP_DUAL_DEPLOY: u8 = 0xA0;

/// Largest transfer a single flash read or write may carry.
pub const MAX_FLASH_TRANSFER: usize = 31;

/// Sensor poll stream control bytes.
pub mod poll {
    pub const START: u8 = 0xF3;
    pub const REQUEST: u8 = 0x51;
    pub const WAIT: u8 = 0x44;
    pub const RESUME: u8 = 0xEF;
    pub const STOP: u8 = 0x74;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgniteTarget {
    Main,
    Drogue,
    /// Continuity check, no ignition.
    Continuity,
}

impl IgniteTarget {
    pub fn code(self) -> u8 {
        match self {
            IgniteTarget::Main => 0x01,
            IgniteTarget::Drogue => 0x02,
            IgniteTarget::Continuity => 0x03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashCommand {
    Read { address: u32, count: u8 },
    Enable,
    Disable,
    Write { address: u32, data: Vec<u8> },
    Erase,
    Status,
    Extract,
}

impl FlashCommand {
    pub fn code(&self) -> u8 {
        match self {
            FlashCommand::Read { .. } => 0x01,
            FlashCommand::Enable => 0x02,
            FlashCommand::Disable => 0x03,
            FlashCommand::Write { .. } => 0x04,
            FlashCommand::Erase => 0x05,
            FlashCommand::Status => 0x06,
            FlashCommand::Extract => 0x07,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorCommand {
    Dump,
    /// Poll the sensors identified by their poll sub-codes.
    Poll { codes: Vec<u8> },
}

impl SensorCommand {
    pub fn code(&self) -> u8 {
        match self {
            SensorCommand::Dump => 0x01,
            SensorCommand::Poll { .. } => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualDeployCommand {
    Status,
    Extract,
}

impl DualDeployCommand {
    pub fn code(self) -> u8 {
        match self {
            DualDeployCommand::Status => 0x01,
            DualDeployCommand::Extract => 0x02,
        }
    }
}

/// A request as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Connect,
    Ignite(IgniteTarget),
    Flash(FlashCommand),
    Sensor(SensorCommand),
    DualDeploy(DualDeployCommand),
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Ping => OP_PING,
            Command::Connect => OP_CONNECT,
            Command::Ignite(_) => OP_IGNITE,
            Command::Flash(_) => OP_FLASH,
            Command::Sensor(_) => OP_SENSOR,
            Command::DualDeploy(_) => OP_DUAL_DEPLOY,
        }
    }

    pub fn subcode(&self) -> Option<u8> {
        match self {
            Command::Ping | Command::Connect => None,
            Command::Ignite(target) => Some(target.code()),
            Command::Flash(cmd) => Some(cmd.code()),
            Command::Sensor(cmd) => Some(cmd.code()),
            Command::DualDeploy(cmd) => Some(cmd.code()),
        }
    }

    /// Serialize opcode, sub-opcode and payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![self.opcode()];
        bytes.extend(self.subcode());

        match self {
            Command::Flash(FlashCommand::Read { address, count }) => {
                check_transfer_len(usize::from(*count))?;
                bytes.extend_from_slice(&codec::encode_address(*address)?);
                bytes.push(*count);
            }
            Command::Flash(FlashCommand::Write { address, data }) => {
                check_transfer_len(data.len())?;
                bytes.extend_from_slice(&codec::encode_address(*address)?);
                bytes.push(data.len() as u8);
                bytes.extend_from_slice(data);
            }
            Command::Sensor(SensorCommand::Poll { codes }) => {
                let count = u8::try_from(codes.len()).map_err(|_| {
                    DriverError::InvalidArgument(format!("cannot poll {} sensors at once", codes.len()))
                })?;
                if count == 0 {
                    return Err(DriverError::InvalidArgument("no sensors selected for polling".into()));
                }
                bytes.push(count);
                bytes.extend_from_slice(codes);
            }
            _ => {}
        }
        Ok(bytes)
    }
}

fn check_transfer_len(len: usize) -> Result<()> {
    if len == 0 || len > MAX_FLASH_TRANSFER {
        return Err(DriverError::InvalidArgument(format!(
            "flash transfers carry 1 to {MAX_FLASH_TRANSFER} bytes, got {len}"
        )));
    }
    Ok(())
}

// ============================================================================
// Responses
// ============================================================================

/// Result code of an ignition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionStatus {
    Success,
    SwitchNotArmed,
    NoContinuity,
    FailedToIgnite,
    /// The controller did not recognize the ignition sub-command.
    UnrecognizedCommand,
}

impl IgnitionStatus {
    pub fn from_response(byte: Option<u8>) -> Result<Self> {
        match byte {
            None => Err(DriverError::NoResponse("ignite")),
            Some(0x01) => Ok(IgnitionStatus::Success),
            Some(0x02) => Ok(IgnitionStatus::SwitchNotArmed),
            Some(0x03) => Ok(IgnitionStatus::NoContinuity),
            Some(0x04) => Ok(IgnitionStatus::FailedToIgnite),
            Some(0x05) => Ok(IgnitionStatus::UnrecognizedCommand),
            Some(byte) => Err(DriverError::UnrecognizedResponse { command: "ignite", byte }),
        }
    }

    pub fn is_success(self) -> bool {
        self == IgnitionStatus::Success
    }

    pub fn message(self) -> &'static str {
        match self {
            IgnitionStatus::Success => "Ignition successful",
            IgnitionStatus::SwitchNotArmed => {
                "Ignition unsuccessful. Device is not armed. Ensure the switch terminals are shorted."
            }
            IgnitionStatus::NoContinuity => {
                "Ignition unsuccessful. No ematch continuity. Ensure an ematch is connected."
            }
            IgnitionStatus::FailedToIgnite => "Ignition unsuccessful. Ematch failed to ignite.",
            IgnitionStatus::UnrecognizedCommand => "Error: unrecognized ignition response code",
        }
    }
}

impl fmt::Display for IgnitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Continuity bitmask returned by `ignite cont`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuity {
    pub switch: bool,
    pub main: bool,
    pub drogue: bool,
}

impl Continuity {
    pub fn from_byte(mask: u8) -> Self {
        Self {
            switch: codec::get_bit(mask, 0) == 1,
            main: codec::get_bit(mask, 1) == 1,
            drogue: codec::get_bit(mask, 2) == 1,
        }
    }

    /// One status line per channel, in switch / main / drogue order.
    pub fn lines(&self) -> [String; 3] {
        let state = |connected: bool| if connected { "Connected" } else { "Disconnected" };
        [
            format!("Switch: {}", state(self.switch)),
            format!("Main Ematch: {}", state(self.main)),
            format!("Drogue Ematch: {}", state(self.drogue)),
        ]
    }
}

impl fmt::Display for Continuity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Flash chip status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashStatusRegister(pub u8);

impl FlashStatusRegister {
    pub const BITS: [&'static str; 8] = ["BUSY", "WEL", "BP0", "BP1", "BP2", "BP3", "AAI", "BPL"];

    pub fn bit(self, name: &str) -> Option<u8> {
        Self::BITS
            .iter()
            .position(|b| *b == name)
            .map(|i| codec::get_bit(self.0, i as u8))
    }

    pub fn busy(self) -> bool {
        codec::get_bit(self.0, 0) == 1
    }

    pub fn write_enabled(self) -> bool {
        codec::get_bit(self.0, 1) == 1
    }

    /// Block protection bits BP0..BP3 as a 4-bit value.
    pub fn block_protection(self) -> u8 {
        (self.0 >> 2) & 0x0F
    }

    pub fn auto_address_increment(self) -> bool {
        codec::get_bit(self.0, 6) == 1
    }

    pub fn block_protection_locked(self) -> bool {
        codec::get_bit(self.0, 7) == 1
    }

    /// `(name, bit value)` pairs from bit 0 to bit 7.
    pub fn fields(self) -> impl Iterator<Item = (&'static str, u8)> {
        Self::BITS
            .into_iter()
            .enumerate()
            .map(move |(i, name)| (name, codec::get_bit(self.0, i as u8)))
    }
}

impl fmt::Display for FlashStatusRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.fields() {
            writeln!(f, "{name:<4}: {value}")?;
        }
        Ok(())
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let field = bytes.get(offset..offset + 4).ok_or(DriverError::BufferTooShort {
        needed: offset + 4,
        available: bytes.len(),
    })?;
    codec::bytes_to_uint(field, ByteOrder::Little)
}

fn read_f32(bytes: &[u8], offset: usize) -> Result<f32> {
    let field = bytes.get(offset..offset + 4).ok_or(DriverError::BufferTooShort {
        needed: offset + 4,
        available: bytes.len(),
    })?;
    codec::bytes_to_f32(field)
}

/// Configuration reported by the dual-deploy firmware.
#[derive(Debug, Clone, PartialEq)]
pub struct DualDeployStatus {
    /// Main parachute deployment altitude, ft.
    pub main_altitude: u32,
    /// Drogue deployment delay after apogee, s.
    pub drogue_delay: u32,
    /// Ground-level pressure, kPa.
    pub ground_pressure: f64,
    /// Detection loop periods, ms.
    pub launch_detect_rate: u32,
    pub apogee_detect_rate: u32,
    pub main_detect_rate: u32,
    pub landing_detect_rate: u32,
}

impl DualDeployStatus {
    pub const SIZE: usize = 28;

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            main_altitude: read_u32(bytes, 0)?,
            drogue_delay: read_u32(bytes, 4)?,
            ground_pressure: f64::from(read_f32(bytes, 8)?) / 1000.0,
            launch_detect_rate: read_u32(bytes, 12)?,
            apogee_detect_rate: read_u32(bytes, 16)?,
            main_detect_rate: read_u32(bytes, 20)?,
            landing_detect_rate: read_u32(bytes, 24)?,
        })
    }

    /// `(label, value, unit)` rows for display.
    pub fn entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("Main Deployment Altitude", self.main_altitude.to_string(), "ft"),
            ("Drogue Delay", self.drogue_delay.to_string(), "s"),
            ("Ground Pressure", self.ground_pressure.to_string(), "kPa"),
            ("Launch Detect Sample Rate", self.launch_detect_rate.to_string(), "ms"),
            ("Apogee Detect Sample Rate", self.apogee_detect_rate.to_string(), "ms"),
            ("Main Altitude Detect Sample Rate", self.main_detect_rate.to_string(), "ms"),
            ("Landing Detect Sample Rate", self.landing_detect_rate.to_string(), "ms"),
        ]
    }
}

/// Flight summary stored at the start of the dual-deploy flash log.
#[derive(Debug, Clone, PartialEq)]
pub struct DualDeployHeader {
    pub main_altitude: u32,
    pub drogue_delay: u32,
    /// Event times since launch detection, ms.
    pub main_deploy_time: u32,
    pub drogue_deploy_time: u32,
    pub landing_time: u32,
    /// Ground-level pressure, kPa.
    pub ground_pressure: f64,
}

impl DualDeployHeader {
    pub const SIZE: usize = 24;

    /// Status byte preceding a header that the firmware considers valid.
    pub const VALID: u8 = 0x00;

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            main_altitude: read_u32(bytes, 0)?,
            drogue_delay: read_u32(bytes, 4)?,
            main_deploy_time: read_u32(bytes, 8)?,
            drogue_deploy_time: read_u32(bytes, 12)?,
            landing_time: read_u32(bytes, 16)?,
            ground_pressure: f64::from(read_f32(bytes, 20)?) / 1000.0,
        })
    }

    pub fn entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("Main Altitude", self.main_altitude.to_string(), "ft"),
            ("Drogue Delay", self.drogue_delay.to_string(), "s"),
            ("Ground Pressure", self.ground_pressure.to_string(), "kPa"),
            ("Main Deploy Time", self.main_deploy_time.to_string(), "ms"),
            ("Drogue Deploy Time", self.drogue_deploy_time.to_string(), "ms"),
            ("Landing Time", self.landing_time.to_string(), "ms"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_commands_encode_opcode_and_subcode() {
        assert_eq!(Command::Ping.encode().unwrap(), [0x01]);
        assert_eq!(Command::Connect.encode().unwrap(), [0x02]);
        assert_eq!(Command::Ignite(IgniteTarget::Continuity).encode().unwrap(), [0x03, 0x03]);
        assert_eq!(Command::Flash(FlashCommand::Extract).encode().unwrap(), [0x04, 0x07]);
        assert_eq!(Command::Sensor(SensorCommand::Dump).encode().unwrap(), [0x05, 0x01]);
        assert_eq!(
            Command::DualDeploy(DualDeployCommand::Status).encode().unwrap(),
            [0xA0, 0x01]
        );
    }

    #[test]
    fn flash_transfers_carry_big_endian_address() {
        let read = Command::Flash(FlashCommand::Read { address: 0x01_02_03, count: 16 });
        assert_eq!(read.encode().unwrap(), [0x04, 0x01, 0x01, 0x02, 0x03, 16]);

        let write = Command::Flash(FlashCommand::Write { address: 0xABCDEF, data: vec![0x5A] });
        assert_eq!(write.encode().unwrap(), [0x04, 0x04, 0xAB, 0xCD, 0xEF, 0x01, 0x5A]);
    }

    #[test]
    fn flash_transfer_limits() {
        let too_many = Command::Flash(FlashCommand::Read { address: 0, count: 32 });
        assert!(matches!(too_many.encode(), Err(DriverError::InvalidArgument(_))));
        let none = Command::Flash(FlashCommand::Write { address: 0, data: vec![] });
        assert!(matches!(none.encode(), Err(DriverError::InvalidArgument(_))));
        let far = Command::Flash(FlashCommand::Read { address: 0x0100_0000, count: 1 });
        assert!(matches!(far.encode(), Err(DriverError::InvalidArgument(_))));
    }

    #[test]
    fn poll_request_lists_sensor_codes() {
        let cmd = Command::Sensor(SensorCommand::Poll { codes: vec![0x0A, 0x0B] });
        assert_eq!(cmd.encode().unwrap(), [0x05, 0x02, 0x02, 0x0A, 0x0B]);
        let empty = Command::Sensor(SensorCommand::Poll { codes: vec![] });
        assert!(empty.encode().is_err());
    }

    #[test]
    fn ignition_status_codes() {
        assert_eq!(IgnitionStatus::from_response(Some(0x01)).unwrap(), IgnitionStatus::Success);
        assert_eq!(
            IgnitionStatus::from_response(Some(0x03)).unwrap(),
            IgnitionStatus::NoContinuity
        );
        assert!(matches!(IgnitionStatus::from_response(None), Err(DriverError::NoResponse(_))));
        assert!(matches!(
            IgnitionStatus::from_response(Some(0x42)),
            Err(DriverError::UnrecognizedResponse { byte: 0x42, .. })
        ));
    }

    #[test]
    fn continuity_bits() {
        let c = Continuity::from_byte(0b0000_0110);
        assert!(!c.switch && c.main && c.drogue);
    }

    #[test]
    fn status_register_bits() {
        let reg = FlashStatusRegister(0b0011_0110);
        assert!(!reg.busy());
        assert!(reg.write_enabled());
        assert_eq!(reg.block_protection(), 0b1101);
        assert_eq!(reg.bit("BP1"), Some(0));
        assert_eq!(reg.bit("BP2"), Some(1));
        assert_eq!(reg.bit("XYZ"), None);
        assert!(!reg.auto_address_increment() && !reg.block_protection_locked());
        assert!(FlashStatusRegister(0b0100_0000).auto_address_increment());
        assert!(reg.to_string().starts_with("BUSY: 0\nWEL : 1\n"));
    }

    #[test]
    fn dual_deploy_status_layout() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&500u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&98_500.0f32.to_le_bytes());
        for rate in [10u32, 20, 30, 40] {
            bytes.extend_from_slice(&rate.to_le_bytes());
        }
        let status = DualDeployStatus::decode(&bytes).unwrap();
        assert_eq!(status.main_altitude, 500);
        assert_eq!(status.drogue_delay, 2);
        assert_eq!(status.ground_pressure, 98.5);
        assert_eq!(status.landing_detect_rate, 40);
        assert!(matches!(
            DualDeployStatus::decode(&bytes[..20]),
            Err(DriverError::BufferTooShort { needed: 24, available: 20 })
        ));
    }
}

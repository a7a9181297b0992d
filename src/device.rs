//! Flight computer session driver.
//!
//! A [`ZavDevice`] owns the transport exclusively and runs one request/response exchange
//! at a time. Every exchange is synchronous: write the command, then block on the
//! transport's read timeout for the response. A failed exchange leaves the session
//! usable; the caller may simply issue the next command.
//!
//! # Connection state
//!
//! Commands that decode sensor data need to know which controller is on the other end.
//! [`ZavDevice::connect`] performs the handshake and binds a [`ConnectionState`];
//! [`ZavDevice::disconnect`] drops it. Ping, ignition and raw flash reads work without
//! a bound controller. The flash write guard lives in the connection state, so toggling
//! it needs one.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::controller::{self, ControllerProfile, Firmware, DUAL_DEPLOY_LOG};
use crate::conversions;
use crate::errors::{DriverError, Result};
use crate::filter;
use crate::frame::{self, SensorFrame};
use crate::protocol::{
    self, Command, Continuity, DualDeployCommand, DualDeployHeader, DualDeployStatus,
    FlashCommand, FlashStatusRegister, IgniteTarget, IgnitionStatus, SensorCommand,
};
use crate::readout::{self, ConvertedReadout};
use crate::transport::{SerialConfig, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the external flash chip on every supported controller.
pub const FLASH_CAPACITY: usize = 524_288;

/// A progress notification is emitted every this many extract blocks.
pub const PROGRESS_INTERVAL: usize = 100;

/// Request/wait/resume rounds in one sensor poll session.
pub const POLL_ITERATIONS: usize = 100;

/// Pause between poll rounds so the output stays readable.
pub const POLL_PAUSE: Duration = Duration::from_millis(200);

/// Frames stored in the dual-deploy flight log.
pub const DUAL_DEPLOY_BLOCKS: usize = 40_960;

// ============================================================================
// Data Types
// ============================================================================

/// Per-connection facts established by the connect handshake.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionState {
    pub profile: &'static ControllerProfile,
    pub firmware: Firmware,
    /// Host-side write guard for the flash chip; set by `flash enable`.
    pub flash_write_enabled: bool,
}

/// Outcome of a ping.
#[derive(Debug, Clone, Copy)]
pub struct PingResponse {
    pub elapsed: Duration,
    /// Identification byte the device answered with.
    pub code: u8,
    /// `None` when the code is not a known controller.
    pub controller: Option<&'static ControllerProfile>,
}

impl fmt::Display for PingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        match self.controller {
            Some(profile) => write!(f, "Response received at {ms:.4} ms from {}", profile.name),
            None => write!(f, "Response received at {ms:.4} ms from an unknown device"),
        }
    }
}

/// Full flash dump, decoded.
#[derive(Debug, Clone)]
pub struct FlashExtract {
    pub profile: &'static ControllerProfile,
    /// Every frame on the chip, erased tail included.
    pub frames: Vec<SensorFrame>,
    pub elapsed: Duration,
}

impl FlashExtract {
    /// Frames holding logged data; `None` when nothing was ever recorded.
    pub fn valid_frames(&self) -> Option<&[SensorFrame]> {
        filter::valid_prefix(&self.frames)
    }
}

/// Dual-deploy flight log.
#[derive(Debug, Clone)]
pub struct DualDeployExtract {
    /// Whether the firmware flagged the stored header as valid.
    pub header_valid: bool,
    pub header: DualDeployHeader,
    /// Logged frames with the erased tail removed.
    pub frames: Vec<SensorFrame>,
}

impl DualDeployExtract {
    /// `(time, altitude ft)` per frame, relative to the header's ground pressure.
    pub fn altitudes(&self) -> Vec<(f64, f64)> {
        self.frames
            .iter()
            .filter_map(|f| {
                let pressure = *f.values.first()?;
                Some((f.time, conversions::pressure_to_alt(pressure, self.header.ground_pressure)))
            })
            .collect()
    }

    /// Highest altitude reached, ft.
    pub fn apogee(&self) -> Option<f64> {
        self.altitudes().into_iter().map(|(_, alt)| alt).reduce(f64::max)
    }
}

// ============================================================================
// Device Driver
// ============================================================================

/// Session with one flight computer.
///
/// # Example
/// ```ignore
/// let mut device = ZavDevice::open(&SerialConfig::new("/dev/ttyUSB0"))?;
/// let state = device.connect()?;
/// println!("Connected to {} running {}", state.profile, state.firmware);
/// for (key, value) in device.sensor_dump()?.iter() {
///     println!("{key} = {value}");
/// }
/// ```
pub struct ZavDevice {
    transport: Box<dyn Transport>,
    state: Option<ConnectionState>,
    poll_pause: Duration,
}

impl ZavDevice {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Wrap an already-open byte stream.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            state: None,
            poll_pause: POLL_PAUSE,
        }
    }

    /// Open the serial port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(config.open()?))
    }

    /// Override the pause between sensor poll rounds.
    pub fn with_poll_pause(mut self, pause: Duration) -> Self {
        self.poll_pause = pause;
        self
    }

    pub fn state(&self) -> Option<&ConnectionState> {
        self.state.as_ref()
    }

    /// Profile of the connected controller.
    pub fn profile(&self) -> Result<&'static ControllerProfile> {
        self.state.map(|s| s.profile).ok_or_else(not_connected)
    }

    // ------------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------------

    /// Send a ping and time the one-byte answer.
    pub fn ping(&mut self) -> Result<PingResponse> {
        let start = Instant::now();
        self.send(&Command::Ping)?;
        let code = self.read_byte()?.ok_or(DriverError::NoResponse("ping"))?;
        let elapsed = start.elapsed();

        let controller = controller::lookup(code).ok();
        if controller.is_none() {
            debug!("Ping answered by unknown device code {code:#04X}");
        }
        Ok(PingResponse {
            elapsed,
            code,
            controller,
        })
    }

    /// Identify the controller and its firmware and bind them to this session.
    pub fn connect(&mut self) -> Result<ConnectionState> {
        self.state = None;
        self.send(&Command::Connect)?;

        let code = self.read_byte()?.ok_or(DriverError::NoResponse("connect"))?;
        let profile = controller::lookup(code)?;
        let firmware_id = self
            .read_byte()?
            .ok_or(DriverError::NoResponse("connect firmware id"))?;
        let firmware = Firmware::from_id(firmware_id)?;

        let state = ConnectionState {
            profile,
            firmware,
            flash_write_enabled: false,
        };
        self.state = Some(state);
        info!("Connection established with {profile} (firmware: {firmware})");
        Ok(state)
    }

    pub fn disconnect(&mut self) {
        if let Some(state) = self.state.take() {
            info!("Disconnected from {}", state.profile);
        }
    }

    // ------------------------------------------------------------------------
    // Ignition
    // ------------------------------------------------------------------------

    /// Fire the main or drogue ematch.
    pub fn ignite(&mut self, target: IgniteTarget) -> Result<IgnitionStatus> {
        if target == IgniteTarget::Continuity {
            return Err(DriverError::InvalidArgument(
                "continuity is a check, not an ignition target".into(),
            ));
        }
        self.send(&Command::Ignite(target))?;
        let status = IgnitionStatus::from_response(self.read_byte()?)?;
        info!("Ignite {target:?}: {status}");
        Ok(status)
    }

    /// Query switch and ematch continuity.
    ///
    /// The channel states are kept even when the trailing status byte never arrives;
    /// the status is `None` in that case.
    pub fn continuity(&mut self) -> Result<(Continuity, Option<IgnitionStatus>)> {
        self.send(&Command::Ignite(IgniteTarget::Continuity))?;
        let mask = self.read_byte()?.ok_or(DriverError::NoResponse("ignite cont"))?;
        let status = match self.read_byte()? {
            Some(byte) => Some(IgnitionStatus::from_response(Some(byte))?),
            None => {
                warn!("Continuity status byte not received");
                None
            }
        };
        Ok((Continuity::from_byte(mask), status))
    }

    // ------------------------------------------------------------------------
    // Flash
    // ------------------------------------------------------------------------

    /// Unlock flash writes. The flag lives in the session, so a connection is required.
    pub fn flash_enable(&mut self) -> Result<()> {
        self.set_flash_write(FlashCommand::Enable, true)
    }

    pub fn flash_disable(&mut self) -> Result<()> {
        self.set_flash_write(FlashCommand::Disable, false)
    }

    fn set_flash_write(&mut self, command: FlashCommand, enabled: bool) -> Result<()> {
        self.profile()?;
        self.send(&Command::Flash(command))?;
        if let Some(state) = self.state.as_mut() {
            state.flash_write_enabled = enabled;
        }
        Ok(())
    }

    /// Read the flash chip status register.
    pub fn flash_status(&mut self) -> Result<FlashStatusRegister> {
        self.send(&Command::Flash(FlashCommand::Status))?;
        let register = self.read_byte()?.ok_or(DriverError::NoResponse("flash status"))?;
        // Trailing command status code, not interpreted.
        if let Some(code) = self.read_byte()? {
            debug!("Flash status command code {code:#04X}");
        }
        Ok(FlashStatusRegister(register))
    }

    /// Write up to 31 bytes starting at `address`. Requires `flash_enable` first.
    pub fn flash_write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let enabled = self.state.map(|s| s.flash_write_enabled).unwrap_or(false);
        if !enabled {
            return Err(DriverError::ProtocolPrecondition(
                "flash write has not been enabled, run flash enable first".into(),
            ));
        }
        self.send(&Command::Flash(FlashCommand::Write {
            address,
            data: data.to_vec(),
        }))?;
        debug!("Wrote {} byte(s) at {address:#08X}", data.len());
        Ok(())
    }

    /// Read `count` (1-31) bytes starting at `address`.
    pub fn flash_read(&mut self, address: u32, count: u8) -> Result<Vec<u8>> {
        self.send(&Command::Flash(FlashCommand::Read { address, count }))?;
        self.expect_bytes(usize::from(count), "flash read")
    }

    /// Erase the whole chip. The controller sends no acknowledgement.
    pub fn flash_erase(&mut self) -> Result<()> {
        self.send(&Command::Flash(FlashCommand::Erase))?;
        info!("Flash erase requested");
        Ok(())
    }

    /// Dump and decode the entire flash chip.
    ///
    /// `progress(done, total)` is called every [`PROGRESS_INTERVAL`] blocks.
    pub fn flash_extract<F>(&mut self, mut progress: F) -> Result<FlashExtract>
    where
        F: FnMut(usize, usize),
    {
        let profile = self.profile()?;
        let total = FLASH_CAPACITY / profile.frame_size;
        let padding = FLASH_CAPACITY % profile.frame_size;

        self.send(&Command::Flash(FlashCommand::Extract))?;
        let start = Instant::now();

        let mut blocks = Vec::with_capacity(total);
        for i in 0..total {
            if i % PROGRESS_INTERVAL == 0 {
                progress(i, total);
            }
            blocks.push(self.expect_bytes(profile.frame_size, "flash extract")?);
        }
        // Unused tail of the chip; read to keep the stream aligned.
        let unused = self.read_bytes(padding)?;
        if unused.len() != padding {
            warn!("Expected {padding} padding bytes after extract, got {}", unused.len());
        }
        let elapsed = start.elapsed();

        let frames = frame::parse_converted(profile, &blocks)?;
        info!("Flash extract: {} frames in {:.3} s", frames.len(), elapsed.as_secs_f64());
        Ok(FlashExtract {
            profile,
            frames,
            elapsed,
        })
    }

    // ------------------------------------------------------------------------
    // Sensors
    // ------------------------------------------------------------------------

    /// One readout of every sensor, in profile order.
    pub fn sensor_dump(&mut self) -> Result<ConvertedReadout> {
        let profile = self.profile()?;
        self.send(&Command::Sensor(SensorCommand::Dump))?;

        let size = self.read_byte()?.ok_or(DriverError::NoResponse("sensor dump"))?;
        let bytes = self.expect_bytes(usize::from(size), "sensor dump")?;
        let keys: Vec<&str> = profile.sensor_keys().collect();
        readout::decode_readouts(profile, &keys, &bytes)
    }

    /// Stream the selected sensors for [`POLL_ITERATIONS`] rounds, handing each readout
    /// to `on_readout`.
    pub fn sensor_poll<F>(&mut self, keys: &[&str], mut on_readout: F) -> Result<()>
    where
        F: FnMut(&ConvertedReadout),
    {
        let profile = self.profile()?;
        let codes = keys
            .iter()
            .map(|k| profile.sensor(k).map(|s| s.poll_code))
            .collect::<Result<Vec<_>>>()?;
        let frame_size = profile.readout_size_of(keys)?;

        self.send(&Command::Sensor(SensorCommand::Poll { codes }))?;
        self.send_raw(&[protocol::poll::START])?;

        let outcome = self.poll_rounds(profile, keys, frame_size, &mut on_readout);
        let stopped = self.send_raw(&[protocol::poll::STOP]);
        outcome.and(stopped)
    }

    fn poll_rounds<F>(
        &mut self,
        profile: &'static ControllerProfile,
        keys: &[&str],
        frame_size: usize,
        on_readout: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&ConvertedReadout),
    {
        for _ in 0..POLL_ITERATIONS {
            self.send_raw(&[protocol::poll::REQUEST])?;
            let bytes = self.expect_bytes(frame_size, "sensor poll")?;
            on_readout(&readout::decode_readouts(profile, keys, &bytes)?);

            self.send_raw(&[protocol::poll::WAIT])?;
            thread::sleep(self.poll_pause);
            self.send_raw(&[protocol::poll::RESUME])?;
        }
        Ok(())
    }

    /// `(key, description)` for every sensor of the connected controller.
    pub fn sensor_list(&self) -> Result<Vec<(&'static str, &'static str)>> {
        Ok(self
            .profile()?
            .sensors
            .iter()
            .map(|s| (s.key, s.description))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Dual deploy
    // ------------------------------------------------------------------------

    pub fn dual_deploy_status(&mut self) -> Result<DualDeployStatus> {
        self.require_firmware(Firmware::DualDeploy)?;
        self.send(&Command::DualDeploy(DualDeployCommand::Status))?;
        let bytes = self.expect_bytes(DualDeployStatus::SIZE, "dual-deploy status")?;
        DualDeployStatus::decode(&bytes)
    }

    /// Download the flight log. `progress(done, total)` as for [`Self::flash_extract`].
    pub fn dual_deploy_extract<F>(&mut self, mut progress: F) -> Result<DualDeployExtract>
    where
        F: FnMut(usize, usize),
    {
        self.require_firmware(Firmware::DualDeploy)?;
        self.send(&Command::DualDeploy(DualDeployCommand::Extract))?;

        let status = self
            .read_byte()?
            .ok_or(DriverError::NoResponse("dual-deploy extract"))?;
        let header_valid = status == DualDeployHeader::VALID;
        if !header_valid {
            warn!("Flight header flagged invalid by controller (status {status:#04X})");
        }
        let header_bytes = self.expect_bytes(DualDeployHeader::SIZE, "dual-deploy header")?;
        let header = DualDeployHeader::decode(&header_bytes)?;

        let mut blocks = Vec::with_capacity(DUAL_DEPLOY_BLOCKS);
        for i in 0..DUAL_DEPLOY_BLOCKS {
            if i % PROGRESS_INTERVAL == 0 {
                progress(i, DUAL_DEPLOY_BLOCKS);
            }
            blocks.push(self.expect_bytes(DUAL_DEPLOY_LOG.frame_size, "dual-deploy extract")?);
        }

        let frames = frame::parse_converted(&DUAL_DEPLOY_LOG, &blocks)?;
        let frames = filter::filter_extract(&frames);
        info!("Dual-deploy extract: {} valid frames", frames.len());
        Ok(DualDeployExtract {
            header_valid,
            header,
            frames,
        })
    }

    // ------------------------------------------------------------------------
    // Internal Methods
    // ------------------------------------------------------------------------

    fn require_firmware(&self, firmware: Firmware) -> Result<()> {
        let state = self.state.ok_or_else(not_connected)?;
        if state.firmware != firmware {
            return Err(DriverError::ProtocolPrecondition(format!(
                "command requires {firmware} firmware, controller runs {}",
                state.firmware
            )));
        }
        Ok(())
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        let bytes = command.encode()?;
        debug!("TX {command:?}: {bytes:02X?}");
        self.send_raw(&bytes)
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    /// One byte, or `None` when the read timed out.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.transport.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Up to `n` bytes; fewer when the read timed out first.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; n];
        let mut filled = 0usize;
        while filled < n {
            match self.transport.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) => return Err(e.into()),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    /// Exactly `n` bytes: an empty read is `NoResponse`, a partial one `BufferTooShort`.
    fn expect_bytes(&mut self, n: usize, command: &'static str) -> Result<Vec<u8>> {
        let bytes = self.read_bytes(n)?;
        match bytes.len() {
            len if len == n => Ok(bytes),
            0 => Err(DriverError::NoResponse(command)),
            len => Err(DriverError::BufferTooShort {
                needed: n,
                available: len,
            }),
        }
    }
}

fn not_connected() -> DriverError {
    DriverError::ProtocolPrecondition("no controller connected, run connect first".into())
}

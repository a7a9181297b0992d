//! Byte-stream transport to the flight computer.
//!
//! The protocol layer only needs a blocking `Read + Write` with a read timeout; a
//! timed-out read means "no response". The serial port is the production backend.

use std::io::{Read, Write};
use std::time::Duration;

use log::debug;

use crate::errors::Result;

/// Baud rate the flight computers' USB-UART bridge is configured for.
pub const BAUD_RATE: u32 = 921_600;

/// Read timeout for normal operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Read timeout when stepping through firmware in a debugger.
pub const DEBUG_TIMEOUT: Duration = Duration::from_secs(100);

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Environment variable selecting debug timeouts.
pub const DEBUG_ENV: &str = "ZAV_DEBUG";

/// Trait for Read + Write + Send, allowing different transport backends.
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Same port, debug read timeout.
    pub fn debug(mut self) -> Self {
        self.timeout = DEBUG_TIMEOUT;
        self
    }

    /// Apply `ZAV_DEBUG` (any value other than empty/"0") to the timeout.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(DEBUG_ENV) {
            Ok(v) if !v.is_empty() && v != "0" => self.debug(),
            _ => self,
        }
    }

    /// Open the port. The returned handle is exclusively owned by the caller.
    pub fn open(&self) -> Result<Box<dyn Transport>> {
        debug!(
            "Opening serial port {} at {} baud (timeout {:?})",
            self.port, self.baud_rate, self.timeout
        );
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.timeout)
            .open()?;
        Ok(Box::new(port))
    }
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    /// Scripted link: replays `rx` to the reader, records everything written.
    /// Reads past the end of the script behave like a serial timeout.
    #[derive(Clone, Default)]
    pub struct MockLink {
        rx: Arc<Mutex<VecDeque<u8>>>,
        tx: Arc<Mutex<Vec<u8>>>,
    }

    impl MockLink {
        pub fn with_response(bytes: &[u8]) -> Self {
            let link = Self::default();
            link.push_response(bytes);
            link
        }

        pub fn push_response(&self, bytes: &[u8]) {
            self.rx.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn written(&self) -> Vec<u8> {
            self.tx.lock().unwrap().clone()
        }

        pub fn pending(&self) -> usize {
            self.rx.lock().unwrap().len()
        }
    }

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut rx = self.rx.lock().unwrap();
            if rx.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
            }
            let n = buf.len().min(rx.len());
            for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

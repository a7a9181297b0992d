//! End-to-end exchanges against a scripted serial link.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zav_terminal::controller::lookup;
use zav_terminal::conversions;
use zav_terminal::protocol::{FlashStatusRegister, IgnitionStatus};
use zav_terminal::{DriverError, ZavDevice};

/// Replays scripted response bytes and records everything the host sends.
struct ScriptedLink {
    rx: VecDeque<u8>,
    tx: Arc<Mutex<Vec<u8>>>,
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "scripted timeout"));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn scripted(response: &[u8]) -> (ZavDevice, Arc<Mutex<Vec<u8>>>) {
    let tx = Arc::new(Mutex::new(Vec::new()));
    let link = ScriptedLink {
        rx: response.iter().copied().collect(),
        tx: Arc::clone(&tx),
    };
    let device = ZavDevice::new(Box::new(link)).with_poll_pause(Duration::ZERO);
    (device, tx)
}

#[test]
fn continuity_check_reports_each_channel() {
    let (mut device, tx) = scripted(&[0b0000_0101, 0x01]);
    let (continuity, status) = device.continuity().unwrap();

    assert_eq!(*tx.lock().unwrap(), [0x03, 0x03]);
    assert_eq!(status, Some(IgnitionStatus::Success));
    assert_eq!(
        continuity.lines(),
        [
            "Switch: Connected".to_string(),
            "Main Ematch: Disconnected".to_string(),
            "Drogue Ematch: Connected".to_string(),
        ]
    );
}

#[test]
fn base_controller_sensor_dump() {
    let mut response = vec![0x01, 0x01, 12];
    for value in [101.3f32, 22.5, 7.4] {
        response.extend_from_slice(&value.to_le_bytes());
    }
    let (mut device, tx) = scripted(&response);

    let state = device.connect().unwrap();
    assert_eq!(state.profile.code, 0x01);
    let readout = device.sensor_dump().unwrap();

    assert_eq!(*tx.lock().unwrap(), [0x02, 0x05, 0x01]);
    let got: Vec<_> = readout.iter().collect();
    assert_eq!(
        got,
        [
            ("pres", conversions::baro_press(f64::from(101.3f32))),
            ("temp", conversions::baro_temp(f64::from(22.5f32))),
            ("vbat", conversions::adc_readout_to_voltage(f64::from(7.4f32))),
        ]
    );
}

#[test]
fn flash_status_register_fields() {
    let (mut device, _) = scripted(&[0b1000_0001, 0x00]);
    let register = device.flash_status().unwrap();
    assert_eq!(register, FlashStatusRegister(0x81));

    let fields: Vec<_> = register.fields().collect();
    assert_eq!(
        fields,
        [
            ("BUSY", 1),
            ("WEL", 0),
            ("BP0", 0),
            ("BP1", 0),
            ("BP2", 0),
            ("BP3", 0),
            ("AAI", 0),
            ("BPL", 1),
        ]
    );
}

#[test]
fn timeouts_are_not_failure_codes() {
    let (mut device, _) = scripted(&[]);
    assert!(matches!(device.continuity(), Err(DriverError::NoResponse(_))));
    assert!(matches!(device.flash_status(), Err(DriverError::NoResponse(_))));
}

#[test]
fn unknown_ignition_code_is_surfaced() {
    let (mut device, _) = scripted(&[0x07, 0x09]);
    assert!(matches!(
        device.continuity(),
        Err(DriverError::UnrecognizedResponse { byte: 0x09, .. })
    ));
}

#[test]
fn unknown_controller_does_not_bind() {
    let (mut device, _) = scripted(&[0x66, 0x01]);
    assert!(matches!(device.connect(), Err(DriverError::UnknownController(0x66))));
    assert!(device.state().is_none());
    assert!(lookup(0x66).is_err());
}

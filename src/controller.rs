//! Static per-controller metadata.
//!
//! Each hardware variant has its own sensor layout. The order of `sensors` in a
//! profile is the wire order of a sensor dump and of every flash frame, and the
//! column order of exported data files.

use std::fmt;

use crate::conversions;
use crate::errors::{DriverError, Result};

/// Width of the millisecond timestamp that starts every flash frame.
pub const TIMESTAMP_SIZE: usize = 4;

/// Wire format of a single sensor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFormat {
    /// Little-endian unsigned integer, `size` bytes wide.
    UnsignedInt,
    /// Little-endian IEEE-754 single.
    Float32,
}

/// How a raw value becomes a physical value.
#[derive(Clone, Copy)]
pub enum Conversion {
    /// No calibration available; the raw value is reported as-is.
    Identity,
    Formula(fn(f64) -> f64),
}

impl Conversion {
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Conversion::Identity => raw,
            Conversion::Formula(f) => f(raw),
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Identity => f.write_str("Identity"),
            Conversion::Formula(_) => f.write_str("Formula(..)"),
        }
    }
}

/// Layout and calibration of one sensor channel.
#[derive(Debug, Clone, Copy)]
pub struct SensorSpec {
    pub key: &'static str,
    pub description: &'static str,
    /// Field width in bytes (1-4).
    pub size: usize,
    pub format: SensorFormat,
    pub unit: Option<&'static str>,
    /// Sub-code identifying this sensor in a poll request.
    pub poll_code: u8,
    pub conversion: Conversion,
}

/// One flight computer hardware variant.
#[derive(Debug)]
pub struct ControllerProfile {
    /// Identification byte returned by ping/connect.
    pub code: u8,
    pub name: &'static str,
    pub sensors: &'static [SensorSpec],
    /// Bytes per flash frame: timestamp plus every sensor field.
    pub frame_size: usize,
}

impl ControllerProfile {
    pub fn sensor(&self, key: &str) -> Result<&SensorSpec> {
        self.sensors
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| DriverError::UnknownSensor(format!("{key} (controller: {})", self.name)))
    }

    pub fn sensor_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sensors.iter().map(|s| s.key)
    }

    /// Sum of all sensor field widths.
    pub fn readout_size(&self) -> usize {
        self.sensors.iter().map(|s| s.size).sum()
    }

    /// Number of bytes occupied by the given sensors, in any order.
    pub fn readout_size_of(&self, keys: &[&str]) -> Result<usize> {
        keys.iter().map(|k| self.sensor(k).map(|s| s.size)).sum()
    }
}

impl fmt::Display for ControllerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Firmware image running on a connected controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firmware {
    Terminal,
    DataLogger,
    DualDeploy,
}

impl Firmware {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(Firmware::Terminal),
            0x02 => Ok(Firmware::DataLogger),
            0x03 => Ok(Firmware::DualDeploy),
            other => Err(DriverError::UnknownFirmware(other)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Firmware::Terminal => 0x01,
            Firmware::DataLogger => 0x02,
            Firmware::DualDeploy => 0x03,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Firmware::Terminal => "Terminal",
            Firmware::DataLogger => "Data Logger",
            Firmware::DualDeploy => "Dual Deploy",
        }
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Sensor tables
// ============================================================================

const fn float_sensor(
    key: &'static str,
    description: &'static str,
    unit: &'static str,
    poll_code: u8,
    conversion: fn(f64) -> f64,
) -> SensorSpec {
    SensorSpec {
        key,
        description,
        size: 4,
        format: SensorFormat::Float32,
        unit: Some(unit),
        poll_code,
        conversion: Conversion::Formula(conversion),
    }
}

const fn imu_sensor(
    key: &'static str,
    description: &'static str,
    unit: &'static str,
    poll_code: u8,
    conversion: fn(f64) -> f64,
) -> SensorSpec {
    SensorSpec {
        key,
        description,
        size: 2,
        format: SensorFormat::UnsignedInt,
        unit: Some(unit),
        poll_code,
        conversion: Conversion::Formula(conversion),
    }
}

// Magnetometer axes and the IMU die temperature have no calibration yet.
const fn uncalibrated_sensor(key: &'static str, description: &'static str, poll_code: u8) -> SensorSpec {
    SensorSpec {
        key,
        description,
        size: 2,
        format: SensorFormat::UnsignedInt,
        unit: None,
        poll_code,
        conversion: Conversion::Identity,
    }
}

const IMU_SENSORS: [SensorSpec; 10] = [
    imu_sensor("accX", "Accelerometer X", "m/s/s", 0x00, conversions::imu_accel),
    imu_sensor("accY", "Accelerometer Y", "m/s/s", 0x01, conversions::imu_accel),
    imu_sensor("accZ", "Accelerometer Z", "m/s/s", 0x02, conversions::imu_accel),
    imu_sensor("gyroX", "Gyroscope X", "deg/s", 0x03, conversions::imu_gyro),
    imu_sensor("gyroY", "Gyroscope Y", "deg/s", 0x04, conversions::imu_gyro),
    imu_sensor("gyroZ", "Gyroscope Z", "deg/s", 0x05, conversions::imu_gyro),
    uncalibrated_sensor("magX", "Magnetometer X", 0x06),
    uncalibrated_sensor("magY", "Magnetometer Y", 0x07),
    uncalibrated_sensor("magZ", "Magnetometer Z", 0x08),
    uncalibrated_sensor("imut", "IMU Die Temperature", 0x09),
];

static BASE_SENSORS: [SensorSpec; 3] = [
    float_sensor("pres", "Barometric Pressure", "kPa", 0x00, conversions::baro_press),
    float_sensor("temp", "Barometric Temperature", "C", 0x01, conversions::baro_temp),
    float_sensor("vbat", "Battery Voltage", "V", 0x02, conversions::adc_readout_to_voltage),
];

static FULL_SENSORS: [SensorSpec; 13] = [
    IMU_SENSORS[0],
    IMU_SENSORS[1],
    IMU_SENSORS[2],
    IMU_SENSORS[3],
    IMU_SENSORS[4],
    IMU_SENSORS[5],
    IMU_SENSORS[6],
    IMU_SENSORS[7],
    IMU_SENSORS[8],
    IMU_SENSORS[9],
    float_sensor("pres", "Barometric Pressure", "kPa", 0x0A, conversions::baro_press),
    float_sensor("temp", "Barometric Temperature", "C", 0x0B, conversions::baro_temp),
    float_sensor("vbat", "Battery Voltage", "V", 0x0C, conversions::adc_readout_to_voltage),
];

static LEGACY_SENSORS: [SensorSpec; 12] = [
    IMU_SENSORS[0],
    IMU_SENSORS[1],
    IMU_SENSORS[2],
    IMU_SENSORS[3],
    IMU_SENSORS[4],
    IMU_SENSORS[5],
    IMU_SENSORS[6],
    IMU_SENSORS[7],
    IMU_SENSORS[8],
    IMU_SENSORS[9],
    float_sensor("pres", "Barometric Pressure", "kPa", 0x0A, conversions::baro_press),
    float_sensor("temp", "Barometric Temperature", "C", 0x0B, conversions::baro_temp),
];

static BARO_ONLY_SENSORS: [SensorSpec; 2] = [
    float_sensor("pres", "Barometric Pressure", "kPa", 0x00, conversions::baro_press),
    float_sensor("temp", "Barometric Temperature", "C", 0x01, conversions::baro_temp),
];

/// Every controller that can answer a connect handshake.
pub static CONTROLLERS: [ControllerProfile; 4] = [
    ControllerProfile {
        code: 0x01,
        name: "Base Flight Computer (A0001 Rev 1.0)",
        sensors: &BASE_SENSORS,
        frame_size: 16,
    },
    ControllerProfile {
        code: 0x02,
        name: "Full Feature Flight Computer (A0002 Rev 1.0)",
        sensors: &FULL_SENSORS,
        frame_size: 36,
    },
    ControllerProfile {
        code: 0x03,
        name: "Legacy SDR Flight Computer (A0003 Rev 1.0)",
        sensors: &LEGACY_SENSORS,
        frame_size: 32,
    },
    ControllerProfile {
        code: 0x04,
        name: "Legacy SDR Flight Computer Lite (A0004 Rev 1.0)",
        sensors: &BARO_ONLY_SENSORS,
        frame_size: 12,
    },
];

/// Frame layout of the dual-deploy firmware's flight log. It is never returned by a
/// connect handshake, only used to decode `dual-deploy extract` data.
pub static DUAL_DEPLOY_LOG: ControllerProfile = ControllerProfile {
    code: 0x07,
    name: "Flight Computer Lite (A0007 Rev 1.0)",
    sensors: &BARO_ONLY_SENSORS,
    frame_size: 12,
};

/// Resolve an identification byte to its controller profile.
pub fn lookup(code: u8) -> Result<&'static ControllerProfile> {
    CONTROLLERS
        .iter()
        .find(|c| c.code == code)
        .ok_or(DriverError::UnknownController(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_timestamp_plus_fields() {
        for profile in CONTROLLERS.iter().chain(std::iter::once(&DUAL_DEPLOY_LOG)) {
            assert_eq!(
                profile.readout_size() + TIMESTAMP_SIZE,
                profile.frame_size,
                "{}",
                profile.name
            );
        }
    }

    #[test]
    fn field_widths_are_within_codec_range() {
        for profile in &CONTROLLERS {
            for sensor in profile.sensors {
                assert!((1..=4).contains(&sensor.size));
                if sensor.format == SensorFormat::Float32 {
                    assert_eq!(sensor.size, 4);
                }
            }
        }
    }

    #[test]
    fn poll_codes_are_unique_per_controller() {
        for profile in &CONTROLLERS {
            let mut codes: Vec<u8> = profile.sensors.iter().map(|s| s.poll_code).collect();
            codes.sort_unstable();
            codes.dedup();
            assert_eq!(codes.len(), profile.sensors.len());
        }
    }

    #[test]
    fn lookup_resolves_known_codes_only() {
        assert_eq!(lookup(0x02).unwrap().name, "Full Feature Flight Computer (A0002 Rev 1.0)");
        assert!(matches!(lookup(0x07), Err(DriverError::UnknownController(0x07))));
        assert!(matches!(lookup(0x00), Err(DriverError::UnknownController(0x00))));
    }

    #[test]
    fn firmware_ids() {
        assert_eq!(Firmware::from_id(0x03).unwrap(), Firmware::DualDeploy);
        assert_eq!(Firmware::from_id(0x02).unwrap().name(), "Data Logger");
        assert!(matches!(Firmware::from_id(0x09), Err(DriverError::UnknownFirmware(0x09))));
    }

    #[test]
    fn key_order_follows_wire_order() {
        let keys: Vec<_> = lookup(0x01).unwrap().sensor_keys().collect();
        assert_eq!(keys, ["pres", "temp", "vbat"]);
        assert_eq!(lookup(0x03).unwrap().sensor("imut").unwrap().poll_code, 0x09);
    }

    #[test]
    fn missing_sensor_is_reported() {
        let lite = lookup(0x04).unwrap();
        assert!(matches!(lite.sensor("vbat"), Err(DriverError::UnknownSensor(_))));
        assert_eq!(lite.readout_size_of(&["temp", "pres"]).unwrap(), 8);
    }
}

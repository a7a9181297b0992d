//! Sensor readout pipeline: wire bytes -> raw values -> physical values.

use std::fmt;

use crate::codec::{self, ByteOrder};
use crate::controller::{ControllerProfile, SensorFormat, SensorSpec};
use crate::errors::{DriverError, Result};

/// A sensor value exactly as decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Unsigned(u32),
    Float(f32),
}

impl RawValue {
    pub fn as_f64(self) -> f64 {
        match self {
            RawValue::Unsigned(v) => f64::from(v),
            RawValue::Float(v) => f64::from(v),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Unsigned(v) => write!(f, "{v}"),
            RawValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Raw values keyed by sensor, in decode order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReadout {
    values: Vec<(&'static str, RawValue)>,
}

impl RawReadout {
    pub fn get(&self, key: &str) -> Option<RawValue> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, RawValue)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Physical values keyed by sensor. Order is preserved from the raw readout, which
/// downstream exports rely on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedReadout {
    values: Vec<(&'static str, f64)>,
}

impl ConvertedReadout {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decode a single field according to its sensor layout.
pub(crate) fn decode_field(sensor: &SensorSpec, bytes: &[u8]) -> Result<RawValue> {
    match sensor.format {
        SensorFormat::Float32 => codec::bytes_to_f32(bytes).map(RawValue::Float),
        SensorFormat::UnsignedInt => {
            codec::bytes_to_uint(bytes, ByteOrder::Little).map(RawValue::Unsigned)
        }
    }
}

/// Walk `keys` in order, consuming each sensor's width from `buffer` with no padding.
///
/// Bytes left over after the last key are ignored.
pub fn decode_raw_readouts(
    profile: &ControllerProfile,
    keys: &[&str],
    buffer: &[u8],
) -> Result<RawReadout> {
    let mut values = Vec::with_capacity(keys.len());
    let mut offset = 0usize;

    for key in keys {
        let sensor = profile.sensor(key)?;
        let end = offset + sensor.size;
        let field = buffer.get(offset..end).ok_or(DriverError::BufferTooShort {
            needed: end,
            available: buffer.len(),
        })?;
        values.push((sensor.key, decode_field(sensor, field)?));
        offset = end;
    }

    Ok(RawReadout { values })
}

/// Apply each sensor's conversion. Sensors without a calibration pass through.
pub fn convert(profile: &ControllerProfile, raw: &RawReadout) -> ConvertedReadout {
    let values = raw
        .iter()
        .map(|(key, value)| {
            let physical = match profile.sensor(key) {
                Ok(sensor) => sensor.conversion.apply(value.as_f64()),
                Err(_) => value.as_f64(),
            };
            (key, physical)
        })
        .collect();
    ConvertedReadout { values }
}

/// Decode and convert in one step.
pub fn decode_readouts(
    profile: &ControllerProfile,
    keys: &[&str],
    buffer: &[u8],
) -> Result<ConvertedReadout> {
    let raw = decode_raw_readouts(profile, keys, buffer)?;
    Ok(convert(profile, &raw))
}

/// `"<key>: <value>"`, or `"<key>: <value to 3 decimals> <unit>"` when the sensor has a unit.
pub fn format_readout(profile: &ControllerProfile, key: &str, value: f64) -> Result<String> {
    let sensor = profile.sensor(key)?;
    Ok(match sensor.unit {
        Some(unit) => format!("{}: {:.3} {}", sensor.key, value, unit),
        None => format!("{}: {}", sensor.key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{lookup, Conversion};
    use crate::conversions;

    fn full_feature() -> &'static ControllerProfile {
        lookup(0x02).unwrap()
    }

    #[test]
    fn fields_are_consumed_back_to_back() {
        let profile = full_feature();
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(-2i16).to_le_bytes()); // accX
        buffer.extend_from_slice(&0x1234u16.to_le_bytes()); // magX
        buffer.extend_from_slice(&99_000.0f32.to_le_bytes()); // pres

        let raw = decode_raw_readouts(profile, &["accX", "magX", "pres"], &buffer).unwrap();
        assert_eq!(raw.get("accX"), Some(RawValue::Unsigned(0xFFFE)));
        assert_eq!(raw.get("magX"), Some(RawValue::Unsigned(0x1234)));
        assert_eq!(raw.get("pres"), Some(RawValue::Float(99_000.0)));
    }

    #[test]
    fn imu_fields_decode_unsigned_and_convert_signed() {
        let profile = full_feature();
        let raw = decode_raw_readouts(profile, &["accX"], &[0xFE, 0xFF]).unwrap();
        assert_eq!(raw.get("accX"), Some(RawValue::Unsigned(65534)));
        assert_eq!(raw.get("accX").unwrap().to_string(), "65534");

        let converted = convert(profile, &raw);
        assert_eq!(converted.get("accX"), Some(conversions::imu_accel(65534.0)));
        assert!(converted.get("accX").unwrap() < 0.0);
    }

    #[test]
    fn readout_length_follows_requested_keys() {
        let profile = full_feature();
        let raw = decode_raw_readouts(profile, &[], &[0xAA; 4]).unwrap();
        assert!(raw.is_empty());
        assert!(convert(profile, &raw).is_empty());

        let raw = decode_raw_readouts(profile, &["magX", "magY"], &[0xAA; 4]).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(convert(profile, &raw).len(), 2);
    }

    #[test]
    fn short_buffer_is_an_error() {
        let profile = full_feature();
        let err = decode_raw_readouts(profile, &["pres", "temp"], &[0u8; 6]).unwrap_err();
        assert!(matches!(err, DriverError::BufferTooShort { needed: 8, available: 6 }));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = decode_raw_readouts(full_feature(), &["altitude"], &[0u8; 8]).unwrap_err();
        assert!(matches!(err, DriverError::UnknownSensor(_)));
    }

    #[test]
    fn uncalibrated_sensors_pass_through() {
        let profile = full_feature();
        assert!(matches!(profile.sensor("magZ").unwrap().conversion, Conversion::Identity));
        let raw = decode_raw_readouts(profile, &["magZ", "gyroX"], &[0x10, 0x00, 0x00, 0x40]).unwrap();
        let converted = convert(profile, &raw);
        assert_eq!(converted.get("magZ"), Some(16.0));
        assert_eq!(converted.get("gyroX"), Some(conversions::imu_gyro(16384.0)));
    }

    #[test]
    fn converted_order_matches_requested_order() {
        let profile = full_feature();
        let buffer = [0u8; 12];
        let converted = decode_readouts(profile, &["vbat", "accY", "imut", "temp"], &buffer).unwrap();
        let keys: Vec<_> = converted.keys().collect();
        assert_eq!(keys, ["vbat", "accY", "imut", "temp"]);
    }

    #[test]
    fn format_with_and_without_unit() {
        let profile = full_feature();
        assert_eq!(format_readout(profile, "pres", 101.325_49).unwrap(), "pres: 101.325 kPa");
        assert_eq!(format_readout(profile, "accZ", -9.8).unwrap(), "accZ: -9.800 m/s/s");
        assert_eq!(format_readout(profile, "magX", 513.0).unwrap(), "magX: 513");
    }
}

//! Raw readout to physical unit conversions.
//!
//! The barometer and battery channels arrive as IEEE-754 floats already scaled by the
//! flight computer firmware; the IMU channels arrive as 16-bit two's complement codes,
//! decoded unsigned like every other integer field and reinterpreted here.
//!
//! Scale factors below (ADC reference, IMU full-scale ranges) are taken from the
//! flight computer sensor configuration and must be re-checked against the board
//! datasheets whenever the firmware changes sensor ranges.

/// ADC resolution of the battery monitor channel, in bits.
pub const ADC_BITS: u32 = 16;

/// ADC reference voltage.
pub const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// Accelerometer full-scale range, in g.
pub const ACCEL_RANGE_G: f64 = 16.0;

/// Gyroscope full-scale range, in degrees per second.
pub const GYRO_RANGE_DPS: f64 = 2000.0;

/// Standard gravity as used by the flight software.
pub const GRAVITY: f64 = 9.8;

/// Full-scale magnitude of a signed 16-bit IMU code.
const IMU_FULL_SCALE: f64 = 32768.0;

/// Span of a 16-bit field.
const IMU_CODE_SPAN: f64 = 65536.0;

/// Reinterpret an unsigned 16-bit IMU code as two's complement.
fn imu_code_signed(code: f64) -> f64 {
    if code >= IMU_FULL_SCALE {
        code - IMU_CODE_SPAN
    } else {
        code
    }
}

/// Flash timestamp (milliseconds) to seconds.
pub fn time_millis_to_sec(millis: f64) -> f64 {
    millis / 1000.0
}

/// Barometric pressure, Pa to kPa.
pub fn baro_press(pascals: f64) -> f64 {
    pascals / 1000.0
}

/// Barometric temperature. The firmware already reports degrees Celsius.
pub fn baro_temp(celsius: f64) -> f64 {
    celsius
}

/// ADC readout to volts at the converter input.
pub fn adc_readout_to_voltage(readout: f64) -> f64 {
    readout / f64::from(1u32 << ADC_BITS) * ADC_REFERENCE_VOLTS
}

/// Raw accelerometer code to m/s².
pub fn imu_accel(code: f64) -> f64 {
    imu_code_signed(code) / IMU_FULL_SCALE * ACCEL_RANGE_G * GRAVITY
}

/// Raw gyroscope code to deg/s.
pub fn imu_gyro(code: f64) -> f64 {
    imu_code_signed(code) / IMU_FULL_SCALE * GYRO_RANGE_DPS
}

/// Altitude above the ground reference, in feet, from two pressures in kPa.
///
/// Uses the NWS standard-atmosphere pressure altitude relation.
pub fn pressure_to_alt(pressure_kpa: f64, ground_pressure_kpa: f64) -> f64 {
    145_366.45 * (1.0 - (pressure_kpa / ground_pressure_kpa).powf(0.190_284))
}

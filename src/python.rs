//! Python bindings for offline decoding of extracted flight data.
//!
//! Hardware access stays in the CLI; Python tooling gets the decode and filter path so
//! analysis scripts can work on raw dumps without reimplementing the frame layout.

use pyo3::exceptions::{PyIOError, PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::codec;
use crate::controller::{self, ControllerProfile, DUAL_DEPLOY_LOG};
use crate::errors::DriverError;
use crate::filter;
use crate::frame::{self, FrameMode, ParsedFrames};
use crate::logging;
use crate::readout;

impl From<DriverError> for PyErr {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Io(_) | DriverError::Serial(_) | DriverError::Csv(_) => PyIOError::new_err(e.to_string()),
            DriverError::UnknownSensor(_) => PyKeyError::new_err(e.to_string()),
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

fn profile_for(code: u8) -> PyResult<&'static ControllerProfile> {
    if code == DUAL_DEPLOY_LOG.code {
        return Ok(&DUAL_DEPLOY_LOG);
    }
    Ok(controller::lookup(code)?)
}

/// Static description of one controller model.
///
/// Attributes:
///     code: Identification byte returned by the connect handshake.
///     name: Board name.
///     frame_size: Bytes per flash frame, timestamp included.
///     sensors: Sensor keys in frame column order.
#[pyclass(name = "Controller", frozen)]
#[derive(Clone)]
struct PyController {
    #[pyo3(get)]
    code: u8,
    #[pyo3(get)]
    name: &'static str,
    #[pyo3(get)]
    frame_size: usize,
    #[pyo3(get)]
    sensors: Vec<&'static str>,
}

#[pymethods]
impl PyController {
    #[new]
    fn new(code: u8) -> PyResult<Self> {
        profile_for(code).map(PyController::from)
    }

    /// Column names of an exported data file: `time` followed by the sensor keys.
    #[getter]
    fn columns(&self) -> Vec<&'static str> {
        std::iter::once("time").chain(self.sensors.iter().copied()).collect()
    }

    /// Units per sensor key (`None` for uncalibrated channels).
    fn units<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let profile = profile_for(self.code)?;
        let dict = PyDict::new(py);
        for sensor in profile.sensors {
            dict.set_item(sensor.key, sensor.unit)?;
        }
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "Controller(code={:#04x}, name={:?}, frame_size={})",
            self.code, self.name, self.frame_size
        )
    }
}

impl From<&'static ControllerProfile> for PyController {
    fn from(p: &'static ControllerProfile) -> Self {
        PyController {
            code: p.code,
            name: p.name,
            frame_size: p.frame_size,
            sensors: p.sensor_keys().collect(),
        }
    }
}

/// Decode a contiguous flash dump into rows.
///
/// Args:
///     controller_code: Identification byte of the board that produced the dump.
///     data: Raw dump bytes. Trailing bytes that do not fill a frame are ignored.
///     raw: Return each frame's bytes instead of converted values.
///
/// Returns:
///     List of `[time, values...]` rows, or the per-frame bytes when `raw` is set.
#[pyfunction]
#[pyo3(signature = (controller_code, data, raw=false))]
fn parse_frames(py: Python<'_>, controller_code: u8, data: &[u8], raw: bool) -> PyResult<Py<PyAny>> {
    let profile = profile_for(controller_code)?;
    let blocks = frame::split_blocks(profile, data);
    let mode = if raw { FrameMode::RawBytes } else { FrameMode::Converted };
    let parsed = frame::parse_frames(profile, &blocks, mode)?;
    let object = match parsed {
        ParsedFrames::Converted(frames) => frames
            .iter()
            .map(|f| f.to_row())
            .collect::<Vec<_>>()
            .into_pyobject(py)?
            .into_any()
            .unbind(),
        ParsedFrames::RawBytes(blocks) => blocks.into_pyobject(py)?.into_any().unbind(),
    };
    Ok(object)
}

/// Drop the erased tail of an extract.
///
/// Returns:
///     The rows holding logged data, or None when the extract is uniform.
#[pyfunction]
fn filter_rows(rows: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    filter::valid_prefix(&rows).map(<[_]>::to_vec)
}

/// Decode a 4-byte little-endian float; the erased pattern `ff ff ff ff` reads as 0.0.
#[pyfunction]
fn bytes_to_float(data: &[u8]) -> PyResult<f32> {
    Ok(codec::bytes_to_f32(data)?)
}

/// Board name for an identification byte.
#[pyfunction]
fn controller_description(code: u8) -> PyResult<&'static str> {
    Ok(controller::lookup(code)?.name)
}

/// Format a converted value the way the terminal prints it.
#[pyfunction]
fn format_readout(controller_code: u8, key: &str, value: f64) -> PyResult<String> {
    Ok(readout::format_readout(profile_for(controller_code)?, key, value)?)
}

/// Forward Rust log records to Python's `logging`.
#[pyfunction]
fn init_logging(py: Python<'_>) -> PyResult<()> {
    logging::init_python_logging(py)
}

/// Set the forwarded log level ("error" .. "trace"); None re-reads `ZAV_LOG`.
#[pyfunction]
#[pyo3(signature = (level=None))]
fn set_log_level(level: Option<&str>) {
    logging::set_python_log_level(level);
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyController>()?;
    m.add_function(wrap_pyfunction!(parse_frames, m)?)?;
    m.add_function(wrap_pyfunction!(filter_rows, m)?)?;
    m.add_function(wrap_pyfunction!(bytes_to_float, m)?)?;
    m.add_function(wrap_pyfunction!(controller_description, m)?)?;
    m.add_function(wrap_pyfunction!(format_readout, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(set_log_level, m)?)?;

    m.add(
        "CONTROLLER_CODES",
        controller::CONTROLLERS.iter().map(|c| c.code).collect::<Vec<_>>(),
    )?;
    m.add("FLASH_CAPACITY", crate::device::FLASH_CAPACITY)?;
    Ok(())
}

//! Logger installation.
//!
//! Binaries get `env_logger` on stderr. With the `python` feature the extension module can
//! instead forward records into Python's `logging`, one Python logger per Rust target
//! (`zav_terminal::device` becomes `zav_terminal.device`).

use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

/// Primary level variable; `RUST_LOG` is consulted when it is unset.
pub const LOG_ENV: &str = "ZAV_LOG";

static RUST_LOG_ONCE: Once = Once::new();

pub(crate) fn env_level() -> LevelFilter {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the stderr logger. Later calls are no-ops.
pub fn init_rust_logging() {
    init_rust_logging_at(env_level());
}

/// Install the stderr logger at an explicit level (e.g. from a `--verbose` flag).
pub fn init_rust_logging_at(level: LevelFilter) {
    RUST_LOG_ONCE.call_once(|| {
        let env = Env::default().default_filter_or(level.as_str().to_ascii_lowercase());
        // Another logger (e.g. the Python bridge) may already be installed.
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(true)
            .try_init();
    });
}

#[cfg(feature = "python")]
pub use self::python_bridge::{init_python_logging, set_python_log_level};

#[cfg(feature = "python")]
mod python_bridge {
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};

    use log::{Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;

    use super::env_level;

    static PY_LOG_ONCE: Once = Once::new();
    static PY_LOGGER: OnceCell<&'static PyLogger> = OnceCell::new();

    struct PyLogger {
        max_level: Mutex<LevelFilter>,
        logging: Py<PyModule>,
        loggers: Mutex<HashMap<String, Py<PyAny>>>,
    }

    fn python_level(level: Level) -> u32 {
        match level {
            Level::Error => 40,
            Level::Warn => 30,
            Level::Info => 20,
            Level::Debug => 10,
            Level::Trace => 5,
        }
    }

    impl PyLogger {
        fn logger_for<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyAny>> {
            let mut loggers = self.loggers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(logger) = loggers.get(name) {
                return Ok(logger.bind(py).clone());
            }
            let logger = self.logging.bind(py).call_method1("getLogger", (name,))?;
            loggers.insert(name.to_string(), logger.clone().unbind());
            Ok(logger)
        }

        fn forward(&self, record: &Record) {
            let name = record.target().replace("::", ".");
            let level = python_level(record.level());
            let message = record.args().to_string();
            Python::attach(|py| {
                let result = self.logger_for(py, &name).and_then(|logger| {
                    if logger.call_method1("isEnabledFor", (level,))?.is_truthy()? {
                        logger.call_method1("log", (level, message))?;
                    }
                    Ok(())
                });
                if let Err(e) = result {
                    e.restore(py);
                }
            });
        }
    }

    impl Log for PyLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            let max = *self.max_level.lock().unwrap_or_else(|e| e.into_inner());
            metadata.level().to_level_filter() <= max
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                self.forward(record);
            }
        }

        fn flush(&self) {}
    }

    /// Route Rust log records into Python's `logging`. Later calls are no-ops.
    pub fn init_python_logging(py: Python<'_>) -> PyResult<()> {
        let level = env_level();
        let logging = py.import("logging")?.unbind();
        PY_LOG_ONCE.call_once(|| {
            let logger: &'static PyLogger = Box::leak(Box::new(PyLogger {
                max_level: Mutex::new(level),
                logging,
                loggers: Mutex::new(HashMap::new()),
            }));
            if log::set_logger(logger).is_ok() {
                log::set_max_level(level);
                let _ = PY_LOGGER.set(logger);
            }
        });
        Ok(())
    }

    /// Change the forwarded level; `None` re-reads the environment. Drops cached loggers
    /// so Python-side configuration changes take effect.
    pub fn set_python_log_level(level: Option<&str>) {
        let level = level
            .and_then(|s| s.parse::<LevelFilter>().ok())
            .unwrap_or_else(env_level);
        if let Some(logger) = PY_LOGGER.get() {
            *logger.max_level.lock().unwrap_or_else(|e| e.into_inner()) = level;
            logger.loggers.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_rust_logging();
        init_rust_logging_at(LevelFilter::Debug);
        log::info!("logger installed");
    }
}

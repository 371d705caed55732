//! Tool configuration
//!
//! Loaded from an optional TOML file; command line options take precedence.
//!
//! ```toml
//! clock_ticks = 250     # kernel HZ for timer_start timeouts
//! endian = "little"     # native | little | big
//! log = "warning"       # error | warning | info | debug
//! ```

use crate::codec::Endian;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tick rate assumed when the system cannot report one
pub const DEFAULT_CLOCK_TICKS: u64 = 100;

/// Diagnostic verbosity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// `tracing` filter directive for this level
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kernel tick rate; read from the system when unset
    pub clock_ticks: Option<u64>,
    pub endian: Endian,
    pub log: LogLevel,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|err| Error::Config(err.to_string()))?;
        if config.clock_ticks == Some(0) {
            return Err(Error::Config("clock_ticks must be positive".to_string()));
        }
        Ok(config)
    }

    /// Configured tick rate, or the running system's
    pub fn clock_ticks(&self) -> u64 {
        self.clock_ticks.unwrap_or_else(system_clock_ticks)
    }
}

/// `sysconf(_SC_CLK_TCK)`, or [`DEFAULT_CLOCK_TICKS`] when unavailable
pub fn system_clock_ticks() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads a constant
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    match u64::try_from(ticks) {
        Ok(ticks) if ticks > 0 => ticks,
        _ => {
            debug!(
                "cannot query clock ticks, assuming {} Hz",
                DEFAULT_CLOCK_TICKS
            );
            DEFAULT_CLOCK_TICKS
        }
    }
}

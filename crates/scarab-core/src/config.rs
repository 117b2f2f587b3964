//! Typed configuration for the simulation container.
//!
//! Configuration can be built in code or loaded from a YAML file; every
//! field has a serde default so partial files work. Validation happens
//! eagerly in the `Simulation` constructor -- a bad port or step length
//! is fatal before anything starts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logger::EventLogConfig;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The control server port is invalid.
    #[error("invalid port: {port}")]
    InvalidPort {
        /// The rejected value.
        port: u16,
    },

    /// The step length is not a usable duration.
    #[error("invalid step length: {value} seconds")]
    InvalidStepLength {
        /// The rejected value.
        value: f64,
    },
}

/// Configuration consumed by the `Simulation` constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Host the control server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the control server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of steps to run before shutting down. Zero means the run
    /// emits a shutdown without ever advancing the clock.
    #[serde(default)]
    pub number_steps: u64,

    /// Minimum wall-clock duration of one step, in seconds. Sub-second
    /// floats are fine; handlers that overrun simply start the next step
    /// immediately.
    #[serde(default)]
    pub step_length_secs: f64,

    /// Start in the paused state and wait for a `start` command from an
    /// external controller.
    #[serde(default)]
    pub start_paused: bool,

    /// Harness mode: no wall-clock pacing. Used when exercising entities
    /// without a network or real-time constraints.
    #[serde(default)]
    pub headless: bool,

    /// Optional event log side channel.
    #[serde(default)]
    pub event_log: Option<EventLogConfig>,
}

fn default_host() -> String {
    String::from("localhost")
}

const fn default_port() -> u16 {
    1234
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            number_steps: 0,
            step_length_secs: 0.0,
            start_paused: false,
            headless: false,
            event_log: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or a validation
    /// error for out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] for invalid YAML or a validation
    /// error for out-of-range values.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the kernel cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] for port 0 and
    /// [`ConfigError::InvalidStepLength`] for a negative or non-finite
    /// step length.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort { port: self.port });
        }
        if !self.step_length_secs.is_finite() || self.step_length_secs < 0.0 {
            return Err(ConfigError::InvalidStepLength {
                value: self.step_length_secs,
            });
        }
        Ok(())
    }

    /// The configured minimum step duration.
    pub fn step_length(&self) -> Duration {
        Duration::from_secs_f64(self.step_length_secs.max(0.0))
    }
}

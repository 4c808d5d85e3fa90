//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration for the `autocal_sim`
//! host. Configuration is loaded from:
//! 1. `config/autocal.toml` (base configuration)
//! 2. Environment variables (prefixed with `AUTOCAL_`)
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore so that field names may
//! keep their own underscores:
//!
//! ```text
//! AUTOCAL_APPLICATION__LOG_LEVEL=debug
//! AUTOCAL_CALIBRATION__MODULE_ID=4
//! AUTOCAL_CALIBRATION__PARAMS__INTER_CYCLE_MS=1500
//! AUTOCAL_SIMULATION__OFFSET_POLLS=10
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rust_autocal::config::AutoCalConfig;
//!
//! let config = AutoCalConfig::load()?;
//! println!("Module: {}", config.calibration.module_id);
//! println!("Mode: {:?}", config.calibration.mode);
//! # Ok::<(), rust_autocal::config::ConfigError>(())
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::ModuleId;
use crate::sequencer::{CalMode, CalParams};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/autocal.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or environment could not be parsed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// A value is out of range
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    /// The configuration could not be written back as TOML
    #[error("Configuration serialization error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoCalConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Calibration run settings
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Simulated module behaviour
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Host polling loop settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Calibration run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Module to calibrate (must be > 0)
    #[serde(default = "default_module_id")]
    pub module_id: ModuleId,
    /// Offset only, or offset followed by volume
    #[serde(default)]
    pub mode: CalMode,
    /// Parameters forwarded to the module
    #[serde(default)]
    pub params: CalParams,
}

/// Behaviour of the simulated module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Offset completion queries answered "not done" before completing
    #[serde(default)]
    pub offset_polls: u32,
    /// Volume completion queries answered "not done" before completing
    #[serde(default)]
    pub volume_polls: u32,
    /// Alarm code reported by the module
    #[serde(default)]
    pub alarm: u8,
    /// Reject the offset start commands
    #[serde(default)]
    pub reject_offset_start: bool,
    /// Reject the volume start command
    #[serde(default)]
    pub reject_volume_start: bool,
}

/// Host polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Interval between two `advance` calls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Give up and stop the run after this many polls (0 = never)
    #[serde(default)]
    pub max_polls: u32,
    /// Continue past the operator gate (false = abort there)
    #[serde(default = "default_continue_at_gate")]
    pub continue_at_gate: bool,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "autocal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_module_id() -> ModuleId {
    1
}

fn default_poll_interval() -> u64 {
    100
}

fn default_continue_at_gate() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            module_id: default_module_id(),
            mode: CalMode::default(),
            params: CalParams::default(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_polls: 0,
            continue_at_gate: default_continue_at_gate(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AutoCalConfig {
    /// Load configuration from `config/autocal.toml` and environment variables
    ///
    /// A missing file is not an error: defaults and environment overrides
    /// still apply.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence, highest first: `AUTOCAL_` environment variables, the TOML
    /// file, built-in defaults. The result is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::extract_from(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration like [`load_from`](Self::load_from) without validating.
    ///
    /// For callers that override values afterwards and call
    /// [`validate`](Self::validate) themselves.
    pub fn extract_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn with_overrides(
        mut self,
        module_id: Option<ModuleId>,
        mode: Option<CalMode>,
        abort_at_gate: bool,
    ) -> Self {
        if let Some(module_id) = module_id {
            self.calibration.module_id = module_id;
        }
        if let Some(mode) = mode {
            self.calibration.mode = mode;
        }
        if abort_at_gate {
            self.runner.continue_at_gate = false;
        }
        self
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUTOCAL_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Module id is positive
    /// - Cycle count is non-zero
    /// - Volume bounds are ordered when the volume step is enabled
    /// - Poll interval is non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.calibration.module_id <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid module_id {}. Must be > 0",
                self.calibration.module_id
            )));
        }

        if self.calibration.params.cycles == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid cycles 0. Must be > 0".to_string(),
            ));
        }

        let volume = &self.calibration.params.volume;
        if self.calibration.mode == CalMode::OffsetAndVolume && volume.min > volume.max {
            return Err(ConfigError::ValidationError(format!(
                "Invalid volume bounds: min {} is greater than max {}",
                volume.min, volume.max
            )));
        }

        if self.runner.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid poll_interval_ms 0. Must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::VolumeParams;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AutoCalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration.params.cycles, 2);
        assert_eq!(config.calibration.params.inter_cycle_ms, 3000);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AutoCalConfig::default();
        config.application.log_level = "invalid".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_invalid_module_id() {
        let mut config = AutoCalConfig::default();
        config.calibration.module_id = 0;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid module_id 0"));
    }

    #[test]
    fn test_zero_cycles_rejected() {
        let mut config = AutoCalConfig::default();
        config.calibration.params.cycles = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_volume_bounds_checked_only_with_volume_step() {
        let mut config = AutoCalConfig::default();
        config.calibration.params.volume = VolumeParams {
            leak: 0.5,
            pressure: 2.0,
            min: 10.0,
            max: 1.0,
        };
        assert!(config.validate().is_ok());

        config.calibration.mode = CalMode::OffsetAndVolume;
        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid volume bounds"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[calibration]
module_id = 5
mode = "offset_and_volume"

[calibration.params]
cycles = 4
offset_max = 1.25

[calibration.params.volume]
leak = 0.3
pressure = 1.5
min = 0.1
max = 0.9

[simulation]
offset_polls = 3
"#
        )
        .unwrap();

        let config = AutoCalConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.calibration.module_id, 5);
        assert_eq!(config.calibration.mode, CalMode::OffsetAndVolume);
        assert_eq!(config.calibration.params.cycles, 4);
        assert_eq!(config.calibration.params.inter_cycle_ms, 3000);
        assert_eq!(config.calibration.params.volume.pressure, 1.5);
        assert_eq!(config.simulation.offset_polls, 3);
        assert_eq!(config.runner.poll_interval_ms, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutoCalConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.calibration.module_id, 1);
        assert_eq!(config.calibration.mode, CalMode::OffsetOnly);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calibration]\nmodule_id = -3\n").unwrap();

        let result = AutoCalConfig::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_overrides_apply_before_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calibration]\nmodule_id = 0\n").unwrap();

        let config = AutoCalConfig::extract_from(file.path()).unwrap();
        assert!(config.validate().is_err());

        let config = config.with_overrides(Some(4), Some(CalMode::OffsetAndVolume), true);
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration.module_id, 4);
        assert_eq!(config.calibration.mode, CalMode::OffsetAndVolume);
        assert!(!config.runner.continue_at_gate);
    }

    #[test]
    fn test_no_overrides_keeps_file_values() {
        let config = AutoCalConfig::default().with_overrides(None, None, false);
        assert_eq!(config.calibration.module_id, 1);
        assert_eq!(config.calibration.mode, CalMode::OffsetOnly);
        assert!(config.runner.continue_at_gate);
    }

    #[test]
    fn test_toml_output_round_trips_through_loader() {
        let mut config = AutoCalConfig::default();
        config.calibration.module_id = 12;
        let rendered = config.to_toml_string().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(rendered.as_bytes()).unwrap();
        let loaded = AutoCalConfig::load_from(file.path()).unwrap();
        assert_eq!(loaded.calibration.module_id, 12);
    }
}

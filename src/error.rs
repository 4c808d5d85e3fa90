//! Custom error types for the application.
//!
//! Two enums cover everything that can go wrong:
//!
//! - **`DeviceError`**: what a measurement module reports back when a command or
//!   query does not go through. The sequencer treats a single failure as final for
//!   that tick and never retries.
//! - **`AutoCalError`**: errors surfaced to the host, such as refusing to start a
//!   run without a bound module, a configuration problem, or the host runner
//!   giving up after too many polls.
//!
//! Using `#[from]`, device and configuration errors convert into `AutoCalError`
//! so callers can use `?` throughout.

use thiserror::Error;

use crate::config::ConfigError;
use crate::device::ModuleId;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AutoCalError>;

/// Failure reported by a measurement module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The module refused a command.
    #[error("Module {module} rejected command '{command}'")]
    Rejected {
        /// Name of the refused command
        command: &'static str,
        /// Addressed module
        module: ModuleId,
    },

    /// No module is attached.
    #[error("No device bound to the sequencer")]
    NotBound,

    /// The command never reached the module.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors returned to the host.
#[derive(Error, Debug)]
pub enum AutoCalError {
    /// A run was requested for module id zero or below.
    #[error("Invalid module id {0}: must be greater than zero")]
    InvalidModuleId(ModuleId),

    /// A run was requested before a module was bound.
    #[error("No device bound to the sequencer")]
    DeviceNotBound,

    /// A module command or query failed.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The host runner gave up.
    #[error("Calibration did not finish within {polls} polls")]
    PollLimitExceeded {
        /// Ticks spent before giving up
        polls: u32,
    },
}

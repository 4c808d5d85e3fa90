//! Core library for the rust_autocal application.
//!
//! This library contains the automatic calibration sequencer that drives a
//! measurement module through offset calibration, optionally followed by
//! volume calibration, together with the device trait it talks to, a
//! simulated module for testing, and the configuration used by the
//! `autocal_sim` host binary.
//!
//! The sequencer never blocks. A host calls
//! [`AutoCalSequencer::advance`](sequencer::AutoCalSequencer::advance) on its
//! own cadence (a timer, a control-loop tick) until the run reports
//! completion.
//!
//! ```
//! use rust_autocal::device::MockModule;
//! use rust_autocal::sequencer::{AutoCalSequencer, CalMode, CalParams, CalPhase};
//!
//! let module = MockModule::new();
//! let mut seq = AutoCalSequencer::with_device(module.clone());
//!
//! seq.start_calibration(3, CalMode::OffsetOnly, CalParams::offset_only(2, 3000, 1.5))
//!     .unwrap();
//! assert!(!seq.advance()); // offset start command issued
//! assert!(!seq.advance()); // offset complete
//! assert_eq!(seq.phase(), CalPhase::End);
//! assert!(seq.advance()); // run complete
//! assert!(!seq.is_running());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod runner;
pub mod sequencer;

pub use error::{AppResult, AutoCalError, DeviceError};
pub use sequencer::{AutoCalSequencer, CalMode, CalParams, CalPhase, RunOutcome, VolumeParams};

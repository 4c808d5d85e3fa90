//! Calibration sequencer.
//!
//! - [`phase`] - phase/mode vocabulary, phase labels and run outcomes
//! - [`params`] - run parameters forwarded to the module
//! - [`auto_cal`] - the polled state machine itself

pub mod auto_cal;
pub mod params;
pub mod phase;

pub use auto_cal::AutoCalSequencer;
pub use params::{CalParams, VolumeParams};
pub use phase::{describe_phase, CalMode, CalPhase, RunOutcome, UnknownPhase, PHASE_COUNT};

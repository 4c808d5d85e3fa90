//! Phase and mode vocabulary of the calibration sequencer.
//!
//! Phase codes are part of the observable contract: the numeric value of a
//! phase doubles as the sequencer's `last_error` code, so the discriminants
//! below must never be reordered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of defined phases. Codes at or above this value are out of range.
pub const PHASE_COUNT: u8 = 7;

/// A named state of the calibration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CalPhase {
    /// No run in progress. Initial and resting state.
    #[default]
    Idle = 0,
    /// Issue the offset start command on the next advance.
    StartOffset = 1,
    /// Poll the module until the offset step reports completion.
    WaitOffsetDone = 2,
    /// Parked until the host calls `continue_or_abort`.
    WaitExternalGate = 3,
    /// Issue the volume start command on the next advance.
    StartVolume = 4,
    /// Check the module's volume completion counter.
    WaitVolumeDone = 5,
    /// Run finished; the next advance reports completion and returns to Idle.
    End = 6,
}

impl CalPhase {
    /// All phases in code order.
    pub const ALL: [CalPhase; PHASE_COUNT as usize] = [
        Self::Idle,
        Self::StartOffset,
        Self::WaitOffsetDone,
        Self::WaitExternalGate,
        Self::StartVolume,
        Self::WaitVolumeDone,
        Self::End,
    ];

    /// Numeric code of this phase.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable label shown to operators.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::StartOffset => "Start Offset calculation",
            Self::WaitOffsetDone => "Wait end of Offset calculation",
            Self::WaitExternalGate => "Wait Master",
            Self::StartVolume => "Start Volume calculation",
            Self::WaitVolumeDone => "Wait end of volume calculation",
            Self::End => "End Calibration",
        }
    }
}

impl fmt::Display for CalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.code(), self.label())
    }
}

/// Returned by `CalPhase::try_from` for codes outside `0..PHASE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPhase(pub u8);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown calibration phase code {}", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl TryFrom<u8> for CalPhase {
    type Error = UnknownPhase;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(UnknownPhase(code))
    }
}

/// Describe a phase code as `"<code> : <label>"`.
///
/// Out-of-range codes degrade to the bare number.
///
/// ```
/// use rust_autocal::sequencer::describe_phase;
///
/// assert_eq!(describe_phase(3), "3 : Wait Master");
/// assert_eq!(describe_phase(42), "42");
/// ```
pub fn describe_phase(code: u8) -> String {
    match CalPhase::try_from(code) {
        Ok(phase) => phase.to_string(),
        Err(_) => code.to_string(),
    }
}

/// Which calibration steps a run performs. Fixed for the duration of a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CalMode {
    /// Offset calibration only.
    #[default]
    OffsetOnly = 0,
    /// Offset calibration, then the external gate, then volume calibration.
    OffsetAndVolume = 1,
}

impl CalMode {
    /// Numeric code of this mode.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// How the most recent run ended.
///
/// `last_error` keeps the module's historical numeric codes, where the same
/// number can mean "finished here" or "failed here". This is the unambiguous
/// reading of the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All requested steps completed.
    Completed,
    /// The run ended early because the module rejected or failed a step.
    Failed(CalPhase),
    /// The operator declined to continue at the external gate.
    Aborted(CalPhase),
    /// The host called `stop` while the run was in progress.
    Stopped,
}

impl RunOutcome {
    /// True only for [`RunOutcome::Completed`].
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

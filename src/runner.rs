//! Host polling loop for the calibration sequencer.
//!
//! The sequencer has no notion of time. A host drives it by calling
//! `advance` on a cadence of its choosing and by answering the operator gate.
//! [`run_to_completion`] is that host loop for headless use: it ticks a
//! `tokio::time::interval`, answers the gate with a fixed [`GatePolicy`], and
//! optionally gives up after a number of polls.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::device::AutoCalDevice;
use crate::error::{AppResult, AutoCalError};
use crate::sequencer::{AutoCalSequencer, RunOutcome};

/// Answer given at the operator gate between offset and volume calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Proceed to volume calibration.
    Continue,
    /// Abort the run.
    Abort,
}

/// Settings of the host polling loop.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Time between two ticks.
    pub poll_interval: Duration,
    /// Stop the run after this many polls. `None` waits forever.
    pub max_polls: Option<u32>,
    /// Answer given at the operator gate.
    pub gate: GatePolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_polls: None,
            gate: GatePolicy::Continue,
        }
    }
}

impl From<&RunnerConfig> for RunnerOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: (config.max_polls > 0).then_some(config.max_polls),
            gate: if config.continue_at_gate {
                GatePolicy::Continue
            } else {
                GatePolicy::Abort
            },
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Number of ticks spent, gate answers included.
    pub polls: u32,
    /// How the run ended, `None` if it never ran.
    pub outcome: Option<RunOutcome>,
    /// Diagnostic code latched by the sequencer.
    pub last_error: u16,
    /// Alarm code read from the module after the run.
    pub alarm: u8,
}

/// Poll `seq` until its current run ends.
///
/// The run must already have been started. Returns immediately with zero
/// polls if the sequencer is idle.
///
/// # Errors
///
/// [`AutoCalError::PollLimitExceeded`] when `max_polls` is reached; the run
/// is stopped before returning.
pub async fn run_to_completion<D: AutoCalDevice>(
    seq: &mut AutoCalSequencer<D>,
    options: &RunnerOptions,
) -> AppResult<RunReport> {
    let mut ticker = interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0u32;

    while seq.is_running() {
        if options.max_polls.is_some_and(|max| polls >= max) {
            warn!(polls, phase = %seq.phase(), "Poll limit reached, stopping calibration");
            seq.stop();
            return Err(AutoCalError::PollLimitExceeded { polls });
        }
        ticker.tick().await;
        polls += 1;

        if seq.is_waiting_on_external_gate() {
            info!(gate = ?options.gate, "Answering operator gate");
            seq.continue_or_abort(options.gate == GatePolicy::Continue);
            continue;
        }
        if seq.advance() {
            break;
        }
    }

    Ok(RunReport {
        polls,
        outcome: seq.last_outcome(),
        last_error: seq.last_error(),
        alarm: seq.alarm(),
    })
}

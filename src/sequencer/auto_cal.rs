//! Automatic calibration sequencer.
//!
//! `AutoCalSequencer` drives a module through offset calibration and, in
//! [`CalMode::OffsetAndVolume`], through an operator gate and a volume
//! calibration. The sequencer never waits: each call to
//! [`advance`](AutoCalSequencer::advance) executes the branch of the current
//! phase once and returns. Waiting is expressed by staying in the same phase
//! until the host polls again.
//!
//! # Phase flow
//!
//! ```text
//! Idle -> StartOffset -> WaitOffsetDone -+-> End -> Idle                 (OffsetOnly)
//!                                        |
//!                                        +-> WaitExternalGate            (OffsetAndVolume)
//!                                              | continue_or_abort(true)
//!                                              v
//!                                            StartVolume -> WaitVolumeDone -> End -> Idle
//! ```
//!
//! A rejected start command jumps straight to `End`. `stop` and
//! `continue_or_abort(false)` return to `Idle` from anywhere.
//!
//! # Last error codes
//!
//! `last_error` holds a phase code, not a pass/fail flag. A clean offset-only
//! run ends with the `End` code (6), and reaching the gate records the
//! `WaitOffsetDone` code (2). Use [`last_outcome`](AutoCalSequencer::last_outcome)
//! to tell success from failure.
//!
//! The sequencer holds no lock. Exactly one owner must drive an instance.

use tracing::{debug, info, warn};

use super::phase::{describe_phase, CalMode, CalPhase, RunOutcome};
use super::params::CalParams;
use crate::device::{AutoCalDevice, ModuleId};
use crate::error::{AppResult, AutoCalError, DeviceError};

/// Calibration state machine bound to one measurement module.
#[derive(Debug)]
pub struct AutoCalSequencer<D> {
    device: Option<D>,
    module: ModuleId,
    phase: CalPhase,
    mode: CalMode,
    params: CalParams,
    last_error: u16,
    /// Phase that failed during the current run, reported when `End` is processed.
    fault: Option<CalPhase>,
    last_outcome: Option<RunOutcome>,
}

impl<D> Default for AutoCalSequencer<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> AutoCalSequencer<D> {
    /// Create an idle sequencer with no device bound.
    pub fn new() -> Self {
        Self {
            device: None,
            module: 0,
            phase: CalPhase::Idle,
            mode: CalMode::OffsetOnly,
            params: CalParams::default(),
            last_error: 0,
            fault: None,
            last_outcome: None,
        }
    }

    /// Create an idle sequencer talking to `device`.
    pub fn with_device(device: D) -> Self {
        let mut seq = Self::new();
        seq.device = Some(device);
        seq
    }

    /// Bind (or replace) the device. Returns the previously bound device.
    pub fn bind_device(&mut self, device: D) -> Option<D> {
        if self.is_running() {
            warn!(phase = %self.phase, "Device replaced while a calibration is running");
        }
        self.device.replace(device)
    }

    /// The bound device, if any.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// True while a run is in progress. Derived from the phase.
    pub fn is_running(&self) -> bool {
        self.phase != CalPhase::Idle
    }

    /// True while parked at the operator gate between offset and volume.
    pub fn is_waiting_on_external_gate(&self) -> bool {
        self.phase == CalPhase::WaitExternalGate
    }

    /// True while running a run that includes the volume step.
    pub fn is_running_volume_phase(&self) -> bool {
        self.is_running() && self.mode == CalMode::OffsetAndVolume
    }

    /// Last recorded phase code (0 = none). See the module docs for how to read it.
    pub fn last_error(&self) -> u16 {
        self.last_error
    }

    /// `last_error` decoded as a phase, or `None` when it is 0.
    pub fn last_error_phase(&self) -> Option<CalPhase> {
        u8::try_from(self.last_error)
            .ok()
            .filter(|code| *code != 0)
            .and_then(|code| CalPhase::try_from(code).ok())
    }

    /// How the most recent run ended, or `None` if no run has ended since the
    /// last start.
    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
    }

    /// Current phase.
    pub fn phase(&self) -> CalPhase {
        self.phase
    }

    /// Mode of the current (or most recent) run.
    pub fn mode(&self) -> CalMode {
        self.mode
    }

    /// Module of the current (or most recent) run, 0 if none was ever started.
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Parameters of the current (or most recent) run.
    pub fn params(&self) -> &CalParams {
        &self.params
    }

    /// Describe a phase code as `"<code> : <label>"`, or the bare number when
    /// the code is out of range.
    pub fn describe_phase(&self, code: u8) -> String {
        describe_phase(code)
    }

    fn enter(&mut self, next: CalPhase) {
        debug!(module = self.module, from = %self.phase, to = %next, "Calibration phase transition");
        self.phase = next;
    }

    fn fail(&mut self, phase: CalPhase) {
        self.last_error = u16::from(phase.code());
        self.fault = Some(phase);
        self.enter(CalPhase::End);
    }
}

impl<D: AutoCalDevice> AutoCalSequencer<D> {
    fn call_device<T>(
        &mut self,
        op: impl FnOnce(&mut D, ModuleId, &CalParams) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let device = self.device.as_mut().ok_or(DeviceError::NotBound)?;
        op(device, self.module, &self.params)
    }

    /// Start a new run on `module`.
    ///
    /// Stores the parameters, clears `last_error` and moves to
    /// [`CalPhase::StartOffset`]. The volume parameters are only used in
    /// [`CalMode::OffsetAndVolume`].
    ///
    /// # Errors
    ///
    /// - [`AutoCalError::InvalidModuleId`] if `module <= 0`
    /// - [`AutoCalError::DeviceNotBound`] if no device is bound
    ///
    /// Nothing changes on error.
    pub fn start_calibration(
        &mut self,
        module: ModuleId,
        mode: CalMode,
        params: CalParams,
    ) -> AppResult<()> {
        if module <= 0 {
            return Err(AutoCalError::InvalidModuleId(module));
        }
        if self.device.is_none() {
            return Err(AutoCalError::DeviceNotBound);
        }
        if self.is_running() {
            warn!(phase = %self.phase, "Restarting calibration over a run in progress");
        }

        self.module = module;
        self.mode = mode;
        self.params = params;
        self.last_error = 0;
        self.fault = None;
        self.last_outcome = None;
        info!(
            module,
            ?mode,
            cycles = params.cycles,
            inter_cycle_ms = params.inter_cycle_ms,
            "Starting automatic calibration"
        );
        self.enter(CalPhase::StartOffset);
        Ok(())
    }

    /// Execute one step of the state machine.
    ///
    /// Returns `true` only on the call that processes [`CalPhase::End`], i.e.
    /// when the run has just finished and the sequencer is back to idle.
    /// Calling it while idle or at the operator gate does nothing.
    pub fn advance(&mut self) -> bool {
        match self.phase {
            CalPhase::Idle | CalPhase::WaitExternalGate => false,
            CalPhase::StartOffset => {
                let mode = self.mode;
                let result = self.call_device(|device, module, p| match mode {
                    CalMode::OffsetOnly => {
                        device.start_offset_only(module, p.cycles, p.inter_cycle_ms, p.offset_max)
                    }
                    CalMode::OffsetAndVolume => device.start_offset_with_volume(
                        module,
                        p.cycles,
                        p.inter_cycle_ms,
                        p.offset_max,
                    ),
                });
                match result {
                    Ok(()) => self.enter(CalPhase::WaitOffsetDone),
                    Err(e) => {
                        warn!(module = self.module, error = %e, "Offset calibration start rejected");
                        self.fail(CalPhase::StartOffset);
                    }
                }
                false
            }
            CalPhase::WaitOffsetDone => {
                match self.call_device(|device, module, _| device.query_offset_complete(module)) {
                    Ok(count) if count > 0 => match self.mode {
                        CalMode::OffsetOnly => {
                            self.last_error = 0;
                            self.enter(CalPhase::End);
                        }
                        CalMode::OffsetAndVolume => {
                            // Marker for "waiting after offset", not a fault
                            self.last_error = u16::from(CalPhase::WaitOffsetDone.code());
                            info!(module = self.module, "Offset calibration done, waiting on operator");
                            self.enter(CalPhase::WaitExternalGate);
                        }
                    },
                    Ok(_) => {}
                    Err(e) => {
                        warn!(module = self.module, error = %e, "Offset completion query failed");
                    }
                }
                false
            }
            CalPhase::StartVolume => {
                let result = self.call_device(|device, module, p| {
                    device.start_volume(
                        module,
                        p.cycles,
                        p.inter_cycle_ms,
                        p.volume.leak,
                        p.volume.pressure,
                        p.volume.min,
                        p.volume.max,
                    )
                });
                match result {
                    Ok(()) => {
                        self.last_error = 0;
                        self.enter(CalPhase::WaitVolumeDone);
                    }
                    Err(e) => {
                        warn!(module = self.module, error = %e, "Volume calibration start rejected");
                        self.fail(CalPhase::StartVolume);
                    }
                }
                false
            }
            CalPhase::WaitVolumeDone => {
                // A zero counter ends the run as failed on the first check,
                // unlike the offset wait which keeps polling.
                match self.call_device(|device, module, _| device.query_volume_complete(module)) {
                    Ok(count) if count > 0 => {
                        self.last_error = 0;
                        self.enter(CalPhase::End);
                    }
                    Ok(_) => {
                        warn!(module = self.module, "Volume calibration not complete");
                        self.fail(CalPhase::WaitVolumeDone);
                    }
                    Err(e) => {
                        warn!(module = self.module, error = %e, "Volume completion query failed");
                        self.fail(CalPhase::WaitVolumeDone);
                    }
                }
                false
            }
            CalPhase::End => {
                self.last_error = u16::from(CalPhase::End.code());
                let outcome = self.fault.take().map_or(RunOutcome::Completed, RunOutcome::Failed);
                self.last_outcome = Some(outcome);
                self.enter(CalPhase::Idle);
                info!(module = self.module, ?outcome, "Automatic calibration finished");
                true
            }
        }
    }

    /// Answer the operator gate.
    ///
    /// With `proceed == true` at [`CalPhase::WaitExternalGate`] the run moves on
    /// to the volume step and `true` is returned. In any other phase a
    /// `true` answer is ignored and `false` is returned.
    ///
    /// With `proceed == false` the current phase code is latched into
    /// `last_error` (0 when idle). During a run a stop is then sent to the
    /// module (its answer does not matter) and the sequencer returns to idle.
    /// Returns `false`.
    pub fn continue_or_abort(&mut self, proceed: bool) -> bool {
        if proceed {
            if !self.is_waiting_on_external_gate() {
                debug!(phase = %self.phase, "Continue ignored outside the operator gate");
                return false;
            }
            info!(module = self.module, "Operator confirmed, starting volume calibration");
            self.enter(CalPhase::StartVolume);
            return true;
        }

        let phase = self.phase;
        self.last_error = u16::from(phase.code());
        if !self.is_running() {
            return false;
        }
        warn!(module = self.module, phase = %phase, "Calibration aborted by operator");
        self.halt();
        self.last_outcome = Some(RunOutcome::Aborted(phase));
        false
    }

    /// Stop the run.
    ///
    /// A stop command is sent only if a module was started and the run is in
    /// progress. The sequencer returns to idle whatever the module answers.
    /// Returns whether the module acknowledged the stop; `false` when nothing
    /// was sent. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        let acknowledged = self.halt();
        if was_running {
            info!(module = self.module, acknowledged, "Automatic calibration stopped");
            self.last_outcome = Some(RunOutcome::Stopped);
        }
        acknowledged
    }

    fn halt(&mut self) -> bool {
        let mut acknowledged = false;
        if self.module > 0 && self.is_running() {
            match self.call_device(|device, module, _| device.stop_calibration(module)) {
                Ok(()) => acknowledged = true,
                Err(e) => warn!(module = self.module, error = %e, "Stop command failed"),
            }
        }
        self.fault = None;
        if self.phase != CalPhase::Idle {
            self.enter(CalPhase::Idle);
        }
        acknowledged
    }

    /// Calibration alarm of the bound module (0 = none).
    ///
    /// Returns 0 when no module was started, no device is bound, or the
    /// query fails.
    pub fn alarm(&mut self) -> u8 {
        if self.module <= 0 || self.device.is_none() {
            return 0;
        }
        match self.call_device(|device, module, _| device.query_alarm(module)) {
            Ok(alarm) => alarm,
            Err(e) => {
                warn!(module = self.module, error = %e, "Alarm query failed");
                0
            }
        }
    }
}

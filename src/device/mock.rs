//! Simulated measurement module for testing
//!
//! This module provides a simulated automatic-calibration interface so the
//! sequencer can be exercised without a physical module. It provides:
//! - Configurable completion latency (in queries, not wall-clock time)
//! - Controllable command rejection
//! - Call logging for test verification
//!
//! `MockModule` is a cheap handle over shared state: clone it, hand one clone
//! to the sequencer and keep the other to inspect the call log.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::device::{AutoCalDevice, ModuleId};
use crate::error::DeviceError;

/// Kind of call made against the module, used for failure injection and log
/// filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCommand {
    /// `start_offset_only`
    StartOffsetOnly,
    /// `start_offset_with_volume`
    StartOffsetWithVolume,
    /// `start_volume`
    StartVolume,
    /// `query_offset_complete`
    QueryOffsetComplete,
    /// `query_volume_complete`
    QueryVolumeComplete,
    /// `stop_calibration`
    Stop,
    /// `query_alarm`
    QueryAlarm,
}

impl MockCommand {
    fn name(self) -> &'static str {
        match self {
            Self::StartOffsetOnly => "start_offset_only",
            Self::StartOffsetWithVolume => "start_offset_with_volume",
            Self::StartVolume => "start_volume",
            Self::QueryOffsetComplete => "query_offset_complete",
            Self::QueryVolumeComplete => "query_volume_complete",
            Self::Stop => "stop_calibration",
            Self::QueryAlarm => "query_alarm",
        }
    }
}

/// One recorded call, with the arguments it was made with.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum MockCall {
    /// Offset start for an offset-only run.
    StartOffsetOnly {
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    },
    /// Offset start announcing a volume step.
    StartOffsetWithVolume {
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    },
    /// Volume start.
    StartVolume {
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        leak: f32,
        pressure: f32,
        volume_min: f32,
        volume_max: f32,
    },
    /// Offset completion query.
    QueryOffsetComplete(ModuleId),
    /// Volume completion query.
    QueryVolumeComplete(ModuleId),
    /// Stop command.
    Stop(ModuleId),
    /// Alarm query.
    QueryAlarm(ModuleId),
}

impl MockCall {
    /// The kind of this call.
    pub fn command(&self) -> MockCommand {
        match self {
            Self::StartOffsetOnly { .. } => MockCommand::StartOffsetOnly,
            Self::StartOffsetWithVolume { .. } => MockCommand::StartOffsetWithVolume,
            Self::StartVolume { .. } => MockCommand::StartVolume,
            Self::QueryOffsetComplete(_) => MockCommand::QueryOffsetComplete,
            Self::QueryVolumeComplete(_) => MockCommand::QueryVolumeComplete,
            Self::Stop(_) => MockCommand::Stop,
            Self::QueryAlarm(_) => MockCommand::QueryAlarm,
        }
    }

    /// The module the call was addressed to.
    pub fn module(&self) -> ModuleId {
        match *self {
            Self::StartOffsetOnly { module, .. }
            | Self::StartOffsetWithVolume { module, .. }
            | Self::StartVolume { module, .. }
            | Self::QueryOffsetComplete(module)
            | Self::QueryVolumeComplete(module)
            | Self::Stop(module)
            | Self::QueryAlarm(module) => module,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    offset_polls_until_done: u32,
    volume_polls_until_done: u32,
    offset_polls: u32,
    volume_polls: u32,
    offset_started: bool,
    volume_started: bool,
    rejected: HashSet<MockCommand>,
    alarm: u8,
    call_log: Vec<MockCall>,
}

/// Simulated module implementing [`AutoCalDevice`].
///
/// # Example
///
/// ```
/// use rust_autocal::device::{AutoCalDevice, MockCommand, MockModule};
///
/// let mut module = MockModule::new().with_offset_polls(2);
/// module.start_offset_only(1, 2, 3000, 0.5).unwrap();
/// assert_eq!(module.query_offset_complete(1).unwrap(), 0);
/// assert_eq!(module.query_offset_complete(1).unwrap(), 0);
/// assert_eq!(module.query_offset_complete(1).unwrap(), 1);
/// assert_eq!(module.count(MockCommand::QueryOffsetComplete), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockModule {
    state: Arc<Mutex<MockState>>,
}

impl MockModule {
    /// Create a module that completes every step on the first query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a module from the `[simulation]` configuration section.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let module = Self::new()
            .with_offset_polls(config.offset_polls)
            .with_volume_polls(config.volume_polls)
            .with_alarm(config.alarm);
        if config.reject_offset_start {
            module.reject(MockCommand::StartOffsetOnly);
            module.reject(MockCommand::StartOffsetWithVolume);
        }
        if config.reject_volume_start {
            module.reject(MockCommand::StartVolume);
        }
        module
    }

    /// Number of offset completion queries answered with 0 before reporting done.
    pub fn with_offset_polls(self, polls: u32) -> Self {
        self.state.lock().offset_polls_until_done = polls;
        self
    }

    /// Number of volume completion queries answered with 0 before reporting done.
    pub fn with_volume_polls(self, polls: u32) -> Self {
        self.state.lock().volume_polls_until_done = polls;
        self
    }

    /// Alarm code returned by `query_alarm`.
    pub fn with_alarm(self, alarm: u8) -> Self {
        self.set_alarm(alarm);
        self
    }

    /// Change the alarm code returned by `query_alarm`.
    pub fn set_alarm(&self, alarm: u8) {
        self.state.lock().alarm = alarm;
    }

    /// Make every subsequent call of this kind fail.
    pub fn reject(&self, command: MockCommand) {
        self.state.lock().rejected.insert(command);
    }

    /// Undo a previous [`reject`](Self::reject).
    pub fn accept(&self, command: MockCommand) {
        self.state.lock().rejected.remove(&command);
    }

    /// Get the call log
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().call_log.clone()
    }

    /// Number of logged calls of the given kind.
    pub fn count(&self, command: MockCommand) -> usize {
        self.state
            .lock()
            .call_log
            .iter()
            .filter(|call| call.command() == command)
            .count()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.state.lock().call_log.clear();
    }

    fn record(&self, call: MockCall) -> Result<(), DeviceError> {
        let command = call.command();
        let module = call.module();
        debug!(?call, "mock module call");
        let mut state = self.state.lock();
        state.call_log.push(call);
        if !state.rejected.contains(&command) {
            return Ok(());
        }
        match command {
            MockCommand::QueryOffsetComplete
            | MockCommand::QueryVolumeComplete
            | MockCommand::QueryAlarm => Err(DeviceError::Transport(format!(
                "injected failure on {}",
                command.name()
            ))),
            _ => Err(DeviceError::Rejected {
                command: command.name(),
                module,
            }),
        }
    }
}

impl AutoCalDevice for MockModule {
    fn start_offset_only(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError> {
        self.record(MockCall::StartOffsetOnly {
            module,
            cycles,
            inter_cycle_ms,
            offset_max,
        })?;
        let mut state = self.state.lock();
        state.offset_started = true;
        state.offset_polls = 0;
        Ok(())
    }

    fn start_offset_with_volume(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError> {
        self.record(MockCall::StartOffsetWithVolume {
            module,
            cycles,
            inter_cycle_ms,
            offset_max,
        })?;
        let mut state = self.state.lock();
        state.offset_started = true;
        state.offset_polls = 0;
        Ok(())
    }

    fn start_volume(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        leak: f32,
        pressure: f32,
        volume_min: f32,
        volume_max: f32,
    ) -> Result<(), DeviceError> {
        self.record(MockCall::StartVolume {
            module,
            cycles,
            inter_cycle_ms,
            leak,
            pressure,
            volume_min,
            volume_max,
        })?;
        let mut state = self.state.lock();
        state.volume_started = true;
        state.volume_polls = 0;
        Ok(())
    }

    fn query_offset_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError> {
        self.record(MockCall::QueryOffsetComplete(module))?;
        let mut state = self.state.lock();
        if !state.offset_started {
            return Ok(0);
        }
        if state.offset_polls < state.offset_polls_until_done {
            state.offset_polls += 1;
            return Ok(0);
        }
        Ok(1)
    }

    fn query_volume_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError> {
        self.record(MockCall::QueryVolumeComplete(module))?;
        let mut state = self.state.lock();
        if !state.volume_started {
            return Ok(0);
        }
        if state.volume_polls < state.volume_polls_until_done {
            state.volume_polls += 1;
            return Ok(0);
        }
        Ok(1)
    }

    fn stop_calibration(&mut self, module: ModuleId) -> Result<(), DeviceError> {
        self.record(MockCall::Stop(module))?;
        let mut state = self.state.lock();
        state.offset_started = false;
        state.volume_started = false;
        Ok(())
    }

    fn query_alarm(&mut self, module: ModuleId) -> Result<u8, DeviceError> {
        self.record(MockCall::QueryAlarm(module))?;
        Ok(self.state.lock().alarm)
    }
}

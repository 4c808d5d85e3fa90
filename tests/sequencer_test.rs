//! Integration tests for the automatic calibration sequencer
//!
//! Drives `AutoCalSequencer` tick by tick against `MockModule` and checks the
//! phase, error code and module traffic after each step.

use rust_autocal::device::{AutoCalDevice, MockCall, MockCommand, MockModule};
use rust_autocal::sequencer::{
    AutoCalSequencer, CalMode, CalParams, CalPhase, RunOutcome, VolumeParams,
};
use rust_autocal::AutoCalError;

const MODULE: i16 = 3;

fn volume_params() -> CalParams {
    CalParams::offset_only(4, 1500, 2.5).with_volume(VolumeParams {
        leak: 0.25,
        pressure: 1.5,
        min: 0.5,
        max: 4.0,
    })
}

fn sequencer(module: &MockModule) -> AutoCalSequencer<MockModule> {
    AutoCalSequencer::with_device(module.clone())
}

/// Check the derived running flag against the phase.
fn assert_consistent(seq: &AutoCalSequencer<MockModule>) {
    assert_eq!(seq.is_running(), seq.phase() != CalPhase::Idle);
}

#[test]
fn test_start_rejects_non_positive_module() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);

    for id in [0, -1, i16::MIN] {
        let result = seq.start_calibration(id, CalMode::OffsetOnly, CalParams::default());
        assert!(matches!(result, Err(AutoCalError::InvalidModuleId(x)) if x == id));
        assert!(!seq.is_running());
        assert_eq!(seq.phase(), CalPhase::Idle);
        assert_eq!(seq.module(), 0);
    }
    assert!(module.calls().is_empty());
}

#[test]
fn test_start_requires_bound_device() {
    let mut seq: AutoCalSequencer<MockModule> = AutoCalSequencer::new();
    let result = seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default());

    assert!(matches!(result, Err(AutoCalError::DeviceNotBound)));
    assert!(!seq.is_running());

    seq.bind_device(MockModule::new());
    assert!(seq
        .start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .is_ok());
    assert!(seq.is_running());
}

#[test]
fn test_offset_only_run() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);
    let params = CalParams::offset_only(5, 2000, 0.75);

    seq.start_calibration(MODULE, CalMode::OffsetOnly, params)
        .unwrap();
    assert_eq!(seq.phase(), CalPhase::StartOffset);
    assert_eq!(seq.last_error(), 0);
    assert!(seq.is_running());
    assert!(!seq.is_running_volume_phase());

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::WaitOffsetDone);
    assert_eq!(
        module.calls(),
        vec![MockCall::StartOffsetOnly {
            module: MODULE,
            cycles: 5,
            inter_cycle_ms: 2000,
            offset_max: 0.75,
        }]
    );

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), 0);
    assert_consistent(&seq);

    assert!(seq.advance());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert!(!seq.is_running());
    // End-of-run marker, not a failure
    assert_eq!(seq.last_error(), u16::from(CalPhase::End.code()));
    assert_eq!(seq.last_outcome(), Some(RunOutcome::Completed));
}

#[test]
fn test_offset_wait_polls_until_complete() {
    let module = MockModule::new().with_offset_polls(4);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    seq.advance();

    for _ in 0..4 {
        assert!(!seq.advance());
        assert_eq!(seq.phase(), CalPhase::WaitOffsetDone);
    }
    seq.advance();
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(module.count(MockCommand::QueryOffsetComplete), 5);
}

#[test]
fn test_offset_and_volume_run() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);

    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    assert!(seq.is_running_volume_phase());

    seq.advance();
    assert_eq!(module.count(MockCommand::StartOffsetWithVolume), 1);
    assert_eq!(module.count(MockCommand::StartOffsetOnly), 0);

    seq.advance();
    assert_eq!(seq.phase(), CalPhase::WaitExternalGate);
    assert!(seq.is_waiting_on_external_gate());
    assert_eq!(seq.last_error(), u16::from(CalPhase::WaitOffsetDone.code()));

    // The gate never opens on its own
    module.clear_log();
    for _ in 0..10 {
        assert!(!seq.advance());
        assert_eq!(seq.phase(), CalPhase::WaitExternalGate);
    }
    assert!(module.calls().is_empty());

    assert!(seq.continue_or_abort(true));
    assert_eq!(seq.phase(), CalPhase::StartVolume);

    seq.advance();
    assert_eq!(seq.phase(), CalPhase::WaitVolumeDone);
    assert_eq!(seq.last_error(), 0);
    assert_eq!(
        module.calls(),
        vec![MockCall::StartVolume {
            module: MODULE,
            cycles: 4,
            inter_cycle_ms: 1500,
            leak: 0.25,
            pressure: 1.5,
            volume_min: 0.5,
            volume_max: 4.0,
        }]
    );

    seq.advance();
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), 0);

    assert!(seq.advance());
    assert!(!seq.is_running());
    assert!(!seq.is_running_volume_phase());
    assert_eq!(seq.last_outcome(), Some(RunOutcome::Completed));
}

#[test]
fn test_abort_at_gate() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();
    assert!(seq.is_waiting_on_external_gate());

    assert!(!seq.continue_or_abort(false));

    assert_eq!(seq.phase(), CalPhase::Idle);
    assert!(!seq.is_running());
    assert_eq!(seq.last_error(), u16::from(CalPhase::WaitExternalGate.code()));
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Aborted(CalPhase::WaitExternalGate))
    );
    assert_eq!(module.count(MockCommand::Stop), 1);
    assert_eq!(module.calls().last(), Some(&MockCall::Stop(MODULE)));
}

#[test]
fn test_abort_ignores_stop_rejection() {
    let module = MockModule::new();
    module.reject(MockCommand::Stop);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();

    assert!(!seq.continue_or_abort(false));
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert_eq!(module.count(MockCommand::Stop), 1);
}

#[test]
fn test_stop_while_idle_is_noop() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);

    assert!(!seq.stop());
    assert!(!seq.stop());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert_eq!(seq.last_outcome(), None);
    assert!(module.calls().is_empty());
}

#[test]
fn test_stop_mid_run() {
    let module = MockModule::new().with_offset_polls(100);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    seq.advance();
    seq.advance();
    assert_eq!(seq.phase(), CalPhase::WaitOffsetDone);

    assert!(seq.stop());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert!(!seq.is_running());
    assert_eq!(seq.last_outcome(), Some(RunOutcome::Stopped));
    assert_eq!(module.count(MockCommand::Stop), 1);

    // Second stop sends nothing
    assert!(!seq.stop());
    assert_eq!(module.count(MockCommand::Stop), 1);
}

#[test]
fn test_stop_unacknowledged_still_idles() {
    let module = MockModule::new().with_offset_polls(100);
    module.reject(MockCommand::Stop);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    seq.advance();

    assert!(!seq.stop());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert!(!seq.is_running());
    assert_eq!(module.count(MockCommand::Stop), 1);
}

#[test]
fn test_advance_while_idle() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);

    for _ in 0..5 {
        assert!(!seq.advance());
    }
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert_eq!(seq.last_error(), 0);
    assert!(module.calls().is_empty());
}

#[test]
fn test_rejected_offset_start_ends_run() {
    let module = MockModule::new();
    module.reject(MockCommand::StartOffsetOnly);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), u16::from(CalPhase::StartOffset.code()));

    assert!(seq.advance());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Failed(CalPhase::StartOffset))
    );
    assert_eq!(module.count(MockCommand::QueryOffsetComplete), 0);
}

#[test]
fn test_rejected_volume_start_ends_run() {
    let module = MockModule::new();
    module.reject(MockCommand::StartVolume);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();
    assert!(seq.continue_or_abort(true));

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), u16::from(CalPhase::StartVolume.code()));

    assert!(seq.advance());
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Failed(CalPhase::StartVolume))
    );
}

#[test]
fn test_volume_not_complete_on_first_check_fails_run() {
    let module = MockModule::new().with_volume_polls(1);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();
    seq.continue_or_abort(true);
    seq.advance();
    assert_eq!(seq.phase(), CalPhase::WaitVolumeDone);

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), u16::from(CalPhase::WaitVolumeDone.code()));
    assert_eq!(module.count(MockCommand::QueryVolumeComplete), 1);

    assert!(seq.advance());
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Failed(CalPhase::WaitVolumeDone))
    );
}

#[test]
fn test_describe_phase() {
    let seq: AutoCalSequencer<MockModule> = AutoCalSequencer::new();
    assert_eq!(seq.describe_phase(1), "1 : Start Offset calculation");
    assert_eq!(seq.describe_phase(5), "5 : Wait end of volume calculation");
    assert_eq!(seq.describe_phase(7), "7");
    assert_eq!(seq.describe_phase(u8::MAX), "255");
}

#[test]
fn test_alarm_delegates_to_module() {
    let module = MockModule::new().with_alarm(0);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    assert_eq!(seq.alarm(), 0);

    module.set_alarm(12);
    assert_eq!(seq.alarm(), 12);

    module.reject(MockCommand::QueryAlarm);
    assert_eq!(seq.alarm(), 0);
}

#[test]
fn test_boxed_device() {
    let module = MockModule::new();
    let device: Box<dyn AutoCalDevice> = Box::new(module.clone());
    let mut seq = AutoCalSequencer::with_device(device);
    seq.start_calibration(MODULE, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    while !seq.advance() {}
    assert_eq!(seq.last_outcome(), Some(RunOutcome::Completed));
    assert_eq!(module.count(MockCommand::StartOffsetOnly), 1);
}

#[test]
fn test_instance_is_reusable() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);

    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();
    seq.continue_or_abort(false);

    seq.start_calibration(MODULE + 1, CalMode::OffsetOnly, CalParams::default())
        .unwrap();
    assert_eq!(seq.last_error(), 0);
    assert_eq!(seq.last_outcome(), None);
    while !seq.advance() {
        assert_consistent(&seq);
    }
    assert_eq!(seq.last_outcome(), Some(RunOutcome::Completed));
    assert_eq!(seq.module(), MODULE + 1);
}

#[test]
fn test_rejected_offset_with_volume_start_ends_run() {
    let module = MockModule::new();
    module.reject(MockCommand::StartOffsetWithVolume);
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();

    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), u16::from(CalPhase::StartOffset.code()));
    assert_eq!(module.count(MockCommand::StartOffsetWithVolume), 1);
    assert_eq!(module.count(MockCommand::StartOffsetOnly), 0);

    assert!(seq.advance());
    assert_eq!(seq.phase(), CalPhase::Idle);
    assert!(!seq.is_running());
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Failed(CalPhase::StartOffset))
    );
    assert_eq!(module.count(MockCommand::QueryOffsetComplete), 0);
}

#[test]
fn test_failed_volume_query_fails_run() {
    let module = MockModule::new();
    let mut seq = sequencer(&module);
    seq.start_calibration(MODULE, CalMode::OffsetAndVolume, volume_params())
        .unwrap();
    seq.advance();
    seq.advance();
    assert!(seq.continue_or_abort(true));
    seq.advance();
    assert_eq!(seq.phase(), CalPhase::WaitVolumeDone);

    module.reject(MockCommand::QueryVolumeComplete);
    assert!(!seq.advance());
    assert_eq!(seq.phase(), CalPhase::End);
    assert_eq!(seq.last_error(), u16::from(CalPhase::WaitVolumeDone.code()));
    assert_eq!(module.count(MockCommand::QueryVolumeComplete), 1);

    assert!(seq.advance());
    assert_eq!(
        seq.last_outcome(),
        Some(RunOutcome::Failed(CalPhase::WaitVolumeDone))
    );
}

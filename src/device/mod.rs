//! Device interface used by the calibration sequencer.
//!
//! A measurement module exposes a narrow command/query API for automatic
//! calibration. Every call is a single request/response that returns
//! immediately: commands either go through or are rejected, and the
//! completion queries return a count that is greater than zero once the
//! module has finished the corresponding step.
//!
//! The transport behind the trait (serial link, fieldbus, vendor DLL) belongs
//! to the host application. [`MockModule`] provides a simulated module for
//! tests and the `autocal_sim` binary.

pub mod mock;

pub use mock::{MockCall, MockCommand, MockModule};

use crate::error::DeviceError;

/// Identifier of a measurement module. Only positive values address a module.
pub type ModuleId = i16;

/// Command/query interface of a module that supports automatic calibration.
pub trait AutoCalDevice {
    /// Start offset calibration with no volume step afterwards.
    fn start_offset_only(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError>;

    /// Start offset calibration that will be followed by a volume calibration.
    fn start_offset_with_volume(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError>;

    /// Start volume calibration.
    #[allow(clippy::too_many_arguments)]
    fn start_volume(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        leak: f32,
        pressure: f32,
        volume_min: f32,
        volume_max: f32,
    ) -> Result<(), DeviceError>;

    /// End-of-calibration counter for the offset step (> 0 means complete).
    fn query_offset_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError>;

    /// End-of-calibration counter for the volume step (> 0 means complete).
    fn query_volume_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError>;

    /// Abort whatever automatic calibration the module is running.
    fn stop_calibration(&mut self, module: ModuleId) -> Result<(), DeviceError>;

    /// Calibration alarm code (0 = no alarm).
    fn query_alarm(&mut self, module: ModuleId) -> Result<u8, DeviceError>;
}

impl<T: AutoCalDevice + ?Sized> AutoCalDevice for Box<T> {
    fn start_offset_only(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError> {
        (**self).start_offset_only(module, cycles, inter_cycle_ms, offset_max)
    }

    fn start_offset_with_volume(
        &mut self,
        module: ModuleId,
        cycles: u16,
        inter_cycle_ms: u16,
        offset_max: f32,
    ) -> Result<(), DeviceError> {
        (**self).start_offset_with_volume(module, cycles, inter_cycle_ms, offset_max)
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
        (**self).start_volume(
            module,
            cycles,
            inter_cycle_ms,
            leak,
            pressure,
            volume_min,
            volume_max,
        )
    }

    fn query_offset_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError> {
        (**self).query_offset_complete(module)
    }

    fn query_volume_complete(&mut self, module: ModuleId) -> Result<u16, DeviceError> {
        (**self).query_volume_complete(module)
    }

    fn stop_calibration(&mut self, module: ModuleId) -> Result<(), DeviceError> {
        (**self).stop_calibration(module)
    }

    fn query_alarm(&mut self, module: ModuleId) -> Result<u8, DeviceError> {
        (**self).query_alarm(module)
    }
}

//! Run parameters forwarded to the module when a calibration starts.

use serde::{Deserialize, Serialize};

/// Volume-step parameters. Only used in `CalMode::OffsetAndVolume`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeParams {
    /// Reference leak volume
    #[serde(default)]
    pub leak: f32,
    /// Test pressure
    #[serde(default)]
    pub pressure: f32,
    /// Lower acceptance bound for the computed volume
    #[serde(default)]
    pub min: f32,
    /// Upper acceptance bound for the computed volume
    #[serde(default)]
    pub max: f32,
}

/// Parameters of one calibration run. Immutable once the run has started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalParams {
    /// Number of measurement cycles per step
    #[serde(default = "default_cycles")]
    pub cycles: u16,
    /// Delay between cycles in milliseconds
    #[serde(default = "default_inter_cycle_ms")]
    pub inter_cycle_ms: u16,
    /// Largest acceptable offset
    #[serde(default)]
    pub offset_max: f32,
    /// Volume-step parameters, ignored for offset-only runs
    #[serde(default)]
    pub volume: VolumeParams,
}

fn default_cycles() -> u16 {
    2
}

fn default_inter_cycle_ms() -> u16 {
    3000
}

impl Default for CalParams {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            inter_cycle_ms: default_inter_cycle_ms(),
            offset_max: 0.0,
            volume: VolumeParams::default(),
        }
    }
}

impl CalParams {
    /// Parameters for an offset step, with zeroed volume parameters.
    pub fn offset_only(cycles: u16, inter_cycle_ms: u16, offset_max: f32) -> Self {
        Self {
            cycles,
            inter_cycle_ms,
            offset_max,
            volume: VolumeParams::default(),
        }
    }

    /// Attach volume-step parameters.
    pub fn with_volume(mut self, volume: VolumeParams) -> Self {
        self.volume = volume;
        self
    }
}

// Timeouts, topics, rig configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::{AXIS_COUNT, AxisState, Rig};
use crate::motor::sync::SpeedSync;

// Upper bound on one blocking bus receive while awaiting acknowledgements
pub const ACK_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

// Total acknowledgement budget for one batch before the run moves on
pub const BATCH_ACK_BUDGET: Duration = Duration::from_secs(3);

// Axes required to report completion before the next batch goes out
pub const DEFAULT_ACK_AXES: [u8; 2] = [1, 2];

// Default gearbox ratios for axes 1..=6
pub const DEFAULT_GEAR_RATIOS: [f64; AXIS_COUNT] = [0.5, 0.5, 1.0, 1.0, 1.0, 1.0];

// Zenoh topics
pub const TOPIC_EVENTS: &str = "hexarm/rt/events"; // worker progress events
pub const TOPIC_HEALTH: &str = "hexarm/state/health"; // health status
pub const TOPIC_ABORT: &str = "hexarm/cmd/abort"; // external abort requests

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-axis configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisConfig {
    pub gear_ratio: f64,
    #[serde(default)]
    pub invert_direction: bool,
}

/// Whole-rig configuration. Defaults match the shipped rig; a JSON file may
/// override any subset of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub axes: [AxisConfig; AXIS_COUNT],
    /// Subset of axes whose completion acknowledgements gate batch advance
    pub ack_axes: Vec<u8>,
    pub speed_sync: SpeedSync,
    pub receive_timeout_ms: u64,
    pub batch_budget_ms: u64,
}

impl Default for RigConfig {
    fn default() -> Self {
        let axes = DEFAULT_GEAR_RATIOS.map(|gear_ratio| AxisConfig {
            gear_ratio,
            invert_direction: false,
        });
        Self {
            axes,
            ack_axes: DEFAULT_ACK_AXES.to_vec(),
            speed_sync: SpeedSync::default(),
            receive_timeout_ms: ACK_RECEIVE_TIMEOUT.as_millis() as u64,
            batch_budget_ms: BATCH_ACK_BUDGET.as_millis() as u64,
        }
    }
}

impl RigConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, axis) in self.axes.iter().enumerate() {
            if !(axis.gear_ratio > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "axis {} gear ratio must be positive, got {}",
                    i + 1,
                    axis.gear_ratio
                )));
            }
        }
        for &id in &self.ack_axes {
            if !(1..=AXIS_COUNT as u8).contains(&id) {
                return Err(ConfigError::Invalid(format!(
                    "ack axis {id} outside 1..={AXIS_COUNT}"
                )));
            }
        }
        Ok(())
    }

    /// Build the per-axis kinematic state this config describes
    pub fn rig(&self) -> Rig {
        Rig::new(
            self.axes
                .map(|axis| AxisState::new(axis.gear_ratio, axis.invert_direction)),
        )
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn batch_budget(&self) -> Duration {
        Duration::from_millis(self.batch_budget_ms)
    }
}

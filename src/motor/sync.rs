// Per-batch speed coordination, applied to a move's frame set before transmit.
//
// A coordinated move carries one commanded speed per axis. The reference
// speed for the batch is the integer average across its frames; a zero
// reference means no scaling is meaningful and the batch passes through
// untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::protocol::MoveBatch;

/// Speed-coordination policy for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSync {
    /// Check the batch against its average reference speed and keep the
    /// commanded speeds. Batches produced by the converter carry one uniform
    /// speed, so this preserves the recorded wire behavior byte for byte.
    #[default]
    Reference,
    /// Scale each axis's speed by its share of the longest travel in the
    /// batch, so axes with different distances finish the move together.
    Proportional,
}

/// Integer-average speed across the batch's frames
pub fn reference_speed(batch: &MoveBatch) -> u16 {
    if batch.is_empty() {
        return 0;
    }
    let sum: u32 = batch.frames().iter().map(|f| u32::from(f.speed)).sum();
    (sum / batch.len() as u32) as u16
}

/// Adjust the speed fields of one batch in place
pub fn adjust_speeds(batch: &mut MoveBatch, mode: SpeedSync) {
    let reference = reference_speed(batch);
    if reference == 0 {
        debug!("Zero reference speed, batch speeds left unchanged");
        return;
    }

    match mode {
        SpeedSync::Reference => {
            debug!("Reference speed {}, commanded speeds kept", reference);
        }
        SpeedSync::Proportional => {
            let max_travel = batch
                .frames()
                .iter()
                .map(|f| f.position_delta.unsigned_abs())
                .max()
                .unwrap_or(0);
            if max_travel == 0 {
                debug!("No travel in batch, speeds unchanged");
                return;
            }
            for frame in batch.frames_mut() {
                let travel = frame.position_delta.unsigned_abs();
                if travel == 0 {
                    // A zero-travel axis finishes instantly at any speed
                    continue;
                }
                let scaled = (u64::from(reference) * u64::from(travel)
                    + u64::from(max_travel) / 2)
                    / u64::from(max_travel);
                let speed = scaled.min(u64::from(u16::MAX)) as u16;
                debug!(
                    "Axis {}: travel {} at speed {} of reference {}",
                    frame.axis_id, travel, speed, reference
                );
                frame.set_speed(speed);
            }
        }
    }
}

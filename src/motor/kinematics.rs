// Axis kinematics for the six-axis rig
// Converts a commanded absolute position into the relative, gear-scaled,
// direction-corrected delta the axis controller expects.

/// Number of driven axes, ids 1..=6
pub const AXIS_COUNT: usize = 6;

/// Positions travel on the wire in hundredths of a unit
const HUNDREDTHS_PER_UNIT: f64 = 100.0;

/// Persistent per-axis state, one record per axis
#[derive(Debug, Clone, Copy)]
pub struct AxisState {
    /// Gearbox ratio converting commanded units into device units
    pub gear_ratio: f64,
    /// Flip the sign of every computed delta for this axis
    pub invert_direction: bool,
    /// Position basis for relative deltas. Stays at its process-start zero:
    /// the controllers have no re-zeroing command, so every delta is
    /// computed against the same reference.
    pub reference_position: f64,
    /// Most recent gear-scaled target, kept for diagnostics display
    pub last_commanded_position: f64,
}

impl AxisState {
    pub fn new(gear_ratio: f64, invert_direction: bool) -> Self {
        Self {
            gear_ratio,
            invert_direction,
            reference_position: 0.0,
            last_commanded_position: 0.0,
        }
    }

    /// Compute the wire delta for an absolute target position and record the
    /// scaled target. The reference position is left untouched.
    pub fn transform(&mut self, target_position: f64) -> i64 {
        let scaled = target_position * self.gear_ratio;
        let mut delta =
            ((scaled - self.reference_position) * HUNDREDTHS_PER_UNIT).round() as i64;
        if self.invert_direction {
            delta = -delta;
        }
        self.last_commanded_position = scaled;
        delta
    }

    /// Restore process-start state, keeping the configuration fields
    pub fn reset(&mut self) {
        self.reference_position = 0.0;
        self.last_commanded_position = 0.0;
    }
}

/// The six axes of one rig, indexed 0..5 with `axis_id = index + 1`
#[derive(Debug, Clone)]
pub struct Rig {
    axes: [AxisState; AXIS_COUNT],
}

impl Rig {
    pub fn new(axes: [AxisState; AXIS_COUNT]) -> Self {
        Self { axes }
    }

    /// Transform a target for one axis. `axis_id` follows the 1..=6 convention.
    pub fn transform(&mut self, axis_id: u8, target_position: f64) -> i64 {
        self.axes[usize::from(axis_id) - 1].transform(target_position)
    }

    pub fn axis(&self, axis_id: u8) -> &AxisState {
        &self.axes[usize::from(axis_id) - 1]
    }

    /// Reset every axis to process-start state
    pub fn reset(&mut self) {
        for axis in &mut self.axes {
            axis.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_axis(gear_ratio: f64) -> AxisState {
        AxisState::new(gear_ratio, false)
    }

    #[test]
    fn test_gear_scaling() {
        let mut axis = plain_axis(0.5);
        assert_eq!(axis.transform(10.0), 500);
        assert_eq!(axis.last_commanded_position, 5.0);
    }

    #[test]
    fn test_unity_gear_passthrough() {
        let mut axis = plain_axis(1.0);
        assert_eq!(axis.transform(20.0), 2000);
        assert_eq!(axis.transform(-3.25), -325);
    }

    #[test]
    fn test_inversion_flips_delta() {
        let mut normal = AxisState::new(0.5, false);
        let mut inverted = AxisState::new(0.5, true);
        assert_eq!(normal.transform(10.0), 500);
        assert_eq!(inverted.transform(10.0), -500);
        // The scaled target is recorded unflipped either way
        assert_eq!(inverted.last_commanded_position, 5.0);
    }

    #[test]
    fn test_reference_does_not_advance() {
        // Deltas stay relative to the zeroed reference, so repeating a
        // target repeats the delta instead of yielding zero.
        let mut axis = plain_axis(1.0);
        assert_eq!(axis.transform(10.0), 1000);
        assert_eq!(axis.transform(10.0), 1000);
        assert_eq!(axis.reference_position, 0.0);
    }

    #[test]
    fn test_rounding_to_hundredths() {
        let mut axis = plain_axis(1.0);
        assert_eq!(axis.transform(0.123), 12);
        assert_eq!(axis.transform(0.126), 13);
        assert_eq!(axis.transform(-0.126), -13);
    }

    #[test]
    fn test_reset_restores_start_state() {
        let mut axis = AxisState::new(0.5, true);
        axis.transform(42.0);
        axis.reset();
        assert_eq!(axis.last_commanded_position, 0.0);
        assert_eq!(axis.reference_position, 0.0);
        assert_eq!(axis.gear_ratio, 0.5, "reset must not touch configuration");
        assert!(axis.invert_direction);
    }

    #[test]
    fn test_rig_axis_convention() {
        let mut axes = [plain_axis(1.0); AXIS_COUNT];
        axes[0] = plain_axis(0.5);
        axes[1] = plain_axis(0.5);
        let mut rig = Rig::new(axes);

        let targets = [10.0, 20.0, 0.0, 0.0, 0.0, 0.0];
        let deltas: Vec<i64> = (1..=AXIS_COUNT as u8)
            .map(|id| rig.transform(id, targets[usize::from(id) - 1]))
            .collect();
        assert_eq!(deltas, vec![500, 1000, 0, 0, 0, 0]);
    }
}

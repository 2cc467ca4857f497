// Motor control module for the six-axis CAN rig
//
// Provides:
// - Frame codec for the axis controller protocol
// - Per-axis kinematics (absolute target -> relative wire delta)
// - Per-batch speed coordination
// - The injected bus seam and a simulated bus
// - The transmission/acknowledge driver

pub mod bus;
pub mod driver;
pub mod kinematics;
pub mod protocol;
pub mod sync;

pub use bus::{Bus, SimBus, TransportError};
pub use driver::{AckPolicy, BatchOutcome, BatchPhase, BatchReport, DriverError, MotorDriver};
pub use kinematics::{AXIS_COUNT, AxisState, Rig};
pub use protocol::{Frame, MoveBatch, MoveStatus, ResponseFrame};
pub use sync::{SpeedSync, adjust_speeds, reference_speed};

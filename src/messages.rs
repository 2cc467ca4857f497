// Event and health types exchanged between the send worker and the shell.
// The worker pushes `RunEvent`s over a one-way channel; the shell logs them
// and republishes them as JSON for any external control surface.

use serde::{Deserialize, Serialize};

/// One progress event from the pipeline worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Carried speed updated by an `F` token
    SpeedChanged { line_no: usize, speed: u16 },
    /// Input line skipped, run continues
    LineSkipped { line_no: usize, reason: String },
    BatchSending { batch_no: usize, frames: usize },
    FrameSent {
        batch_no: usize,
        axis_id: u8,
        hex: String,
        delta: i32,
    },
    BatchComplete { batch_no: usize, elapsed_ms: u64 },
    BatchTimedOut {
        batch_no: usize,
        missing: Vec<u8>,
        elapsed_ms: u64,
    },
    /// Response from an unexpected axis or with a non-complete status
    StrayResponse {
        batch_no: usize,
        axis_id: u8,
        status_code: u8,
    },
    /// Fatal bus failure, the run stops here
    TransportFailed { message: String },
    RunAborted { batches_sent: usize },
    RunFinished { summary: RunSummary },
}

impl RunEvent {
    /// Health implied by this event, if it changes anything
    pub fn health_hint(&self) -> Option<RunHealth> {
        match self {
            RunEvent::BatchComplete { .. } => Some(RunHealth::Ok),
            RunEvent::BatchTimedOut { .. } => Some(RunHealth::AckStale),
            RunEvent::TransportFailed { .. } => Some(RunHealth::Fault),
            _ => None,
        }
    }
}

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub batches_sent: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub aborted: bool,
}

/// Worker condition published on the health topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunHealth {
    /// Last batch acknowledged in time
    Ok,
    /// Last batch ran out its acknowledgement budget
    AckStale,
    /// Transport failure ended the run
    Fault,
}

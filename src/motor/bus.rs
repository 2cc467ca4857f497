// Injected bus handle for the axis controllers.
//
// The pipeline never opens hardware itself: transport bridging belongs to
// the embedding application, which hands the driver a `Bus` implementation
// and owns its open/close lifecycle. Exactly one thread may use the handle
// at a time; the send worker takes ownership for the duration of a run.

use std::collections::{BTreeSet, VecDeque};
use std::thread::sleep;
use std::time::Duration;

use super::protocol::{Frame, MoveStatus, ResponseFrame};

/// Fatal send/receive failure; aborts the run
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus closed")]
    Closed,
}

/// Blocking bus handle, single-owner by contract
pub trait Bus {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Block up to `timeout` for one inbound frame.
    /// `Ok(None)` means nothing arrived within the timeout.
    fn receive(&mut self, timeout: Duration) -> Result<Option<ResponseFrame>, TransportError>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<ResponseFrame>, TransportError> {
        (**self).receive(timeout)
    }
}

/// In-memory bus for tests, demos and `--sim` runs: a configurable subset of
/// axes acknowledges every move frame with "complete" after a fixed latency.
pub struct SimBus {
    acking_axes: BTreeSet<u8>,
    latency: Duration,
    inbound: VecDeque<ResponseFrame>,
    sent: Vec<Frame>,
}

impl SimBus {
    /// Simulated rig where the given axes report move completion
    pub fn acking(axes: &[u8]) -> Self {
        Self {
            acking_axes: axes.iter().copied().collect(),
            latency: Duration::ZERO,
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Delay applied before each delivered response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue an arbitrary response, e.g. a stray frame from an unexpected axis
    pub fn inject(&mut self, response: ResponseFrame) {
        self.inbound.push_back(response);
    }

    /// Every frame sent so far, in transmit order
    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }
}

impl Bus for SimBus {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.acking_axes.contains(&frame.axis_id) {
            self.inbound.push_back(ResponseFrame {
                axis_id: frame.axis_id,
                status_code: MoveStatus::Complete as u8,
            });
        }
        self.sent.push(*frame);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<ResponseFrame>, TransportError> {
        match self.inbound.pop_front() {
            Some(response) => {
                sleep(self.latency);
                Ok(Some(response))
            }
            None => {
                // Nothing pending: behave like a quiet bus and run out the clock
                sleep(timeout);
                Ok(None)
            }
        }
    }
}

// Transmission/handshake coordinator for the six-axis rig
//
// Sends one batch of move frames in ascending axis order, then blocks on the
// bus until every expected axis reports move completion or the batch's
// acknowledgement budget runs out. Batches are strictly sequential: the next
// batch never goes out before the previous one completes or times out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config;
use crate::messages::{RunEvent, RunSummary};

use super::bus::{Bus, TransportError};
use super::protocol::{MoveBatch, ResponseFrame};
use super::sync::{self, SpeedSync};

/// Timeouts governing one batch's handshake
#[derive(Debug, Clone, Copy)]
pub struct AckPolicy {
    /// Upper bound on one blocking receive
    pub receive_timeout: Duration,
    /// Total time allowed for a batch's acknowledgements
    pub batch_budget: Duration,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            receive_timeout: config::ACK_RECEIVE_TIMEOUT,
            batch_budget: config::BATCH_ACK_BUDGET,
        }
    }
}

/// Lifecycle of the batch currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Sending,
    AwaitingAcks,
    Complete,
    TimedOut,
}

/// Final outcome of one batch's handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Complete,
    TimedOut { missing: Vec<u8> },
}

/// Diagnostics for one transmitted batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub acked: Vec<u8>,
    pub stray: Vec<ResponseFrame>,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Transport failure sending to axis {axis_id}: {source}")]
    Send {
        axis_id: u8,
        source: TransportError,
    },

    #[error("Transport failure awaiting acknowledgements: {source}")]
    Receive {
        #[source]
        source: TransportError,
    },
}

/// Owns the bus handle and drives the per-batch state machine
pub struct MotorDriver<B: Bus> {
    bus: B,
    policy: AckPolicy,
    speed_sync: SpeedSync,
    phase: BatchPhase,
    events: Option<UnboundedSender<RunEvent>>,
}

impl<B: Bus> MotorDriver<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            policy: AckPolicy::default(),
            speed_sync: SpeedSync::default(),
            phase: BatchPhase::Idle,
            events: None,
        }
    }

    pub fn with_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_speed_sync(mut self, mode: SpeedSync) -> Self {
        self.speed_sync = mode;
        self
    }

    /// Attach a progress event channel
    pub fn with_events(mut self, events: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // A closed channel only loses progress display, never the run
            let _ = events.send(event);
        }
    }

    /// Send every batch in order, honoring the abort flag between batches.
    /// Ack timeouts log and continue; transport failures end the run.
    pub fn run(
        &mut self,
        batches: &mut [MoveBatch],
        abort: &AtomicBool,
    ) -> Result<RunSummary, DriverError> {
        let mut summary = RunSummary::default();

        for (index, batch) in batches.iter_mut().enumerate() {
            let batch_no = index + 1;

            if abort.load(Ordering::Relaxed) {
                warn!("Abort requested, stopping before batch {}", batch_no);
                summary.aborted = true;
                self.emit(RunEvent::RunAborted {
                    batches_sent: summary.batches_sent,
                });
                break;
            }

            if batch.is_empty() {
                warn!("Batch {} is empty, skipping", batch_no);
                continue;
            }

            let report = self.send_batch(batch_no, batch)?;
            summary.batches_sent += 1;
            match report.outcome {
                BatchOutcome::Complete => summary.completed += 1,
                BatchOutcome::TimedOut { .. } => summary.timed_out += 1,
            }
        }

        self.phase = BatchPhase::Idle;
        info!(
            "Run finished: {} batches sent, {} complete, {} timed out{}",
            summary.batches_sent,
            summary.completed,
            summary.timed_out,
            if summary.aborted { ", aborted" } else { "" }
        );
        Ok(summary)
    }

    /// Drive one batch through `Sending -> AwaitingAcks -> Complete | TimedOut`
    pub fn send_batch(
        &mut self,
        batch_no: usize,
        batch: &mut MoveBatch,
    ) -> Result<BatchReport, DriverError> {
        // Speed coordination happens on the decoded batch just before transmit
        sync::adjust_speeds(batch, self.speed_sync);

        self.phase = BatchPhase::Sending;
        self.emit(RunEvent::BatchSending {
            batch_no,
            frames: batch.len(),
        });

        for frame in batch.frames() {
            self.bus.send(frame).map_err(|source| DriverError::Send {
                axis_id: frame.axis_id,
                source,
            })?;
            debug!("Sent batch {} axis {}: {}", batch_no, frame.axis_id, frame.to_hex_line());
            self.emit(RunEvent::FrameSent {
                batch_no,
                axis_id: frame.axis_id,
                hex: frame.to_hex_line(),
                delta: frame.position_delta,
            });
        }

        self.await_acks(batch_no, batch)
    }

    /// Single accumulating receive loop: every inbound frame is classified
    /// exactly once against the expected-acknowledger set.
    fn await_acks(
        &mut self,
        batch_no: usize,
        batch: &MoveBatch,
    ) -> Result<BatchReport, DriverError> {
        self.phase = BatchPhase::AwaitingAcks;
        let expected = batch.expected_acks();
        let started = Instant::now();
        let mut acked: BTreeSet<u8> = BTreeSet::new();
        let mut stray: Vec<ResponseFrame> = Vec::new();

        let outcome = loop {
            if acked.len() == expected.len() {
                break BatchOutcome::Complete;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.policy.batch_budget {
                let missing: Vec<u8> = expected.difference(&acked).copied().collect();
                break BatchOutcome::TimedOut { missing };
            }

            let timeout = self.policy.receive_timeout.min(self.policy.batch_budget - elapsed);
            let received = self
                .bus
                .receive(timeout)
                .map_err(|source| DriverError::Receive { source })?;

            match received {
                Some(response) if expected.contains(&response.axis_id) && response.is_complete() => {
                    if acked.insert(response.axis_id) {
                        debug!("Axis {} reports move complete", response.axis_id);
                    } else {
                        debug!("Duplicate completion from axis {}", response.axis_id);
                    }
                }
                Some(response) => {
                    debug!(
                        "Stray response from axis {} (status 0x{:02X})",
                        response.axis_id, response.status_code
                    );
                    self.emit(RunEvent::StrayResponse {
                        batch_no,
                        axis_id: response.axis_id,
                        status_code: response.status_code,
                    });
                    stray.push(response);
                }
                None => {
                    // Quiet interval; the loop re-checks the budget
                }
            }
        };

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        match &outcome {
            BatchOutcome::Complete => {
                self.phase = BatchPhase::Complete;
                info!("Batch {} complete in {} ms", batch_no, elapsed_ms);
                self.emit(RunEvent::BatchComplete { batch_no, elapsed_ms });
            }
            BatchOutcome::TimedOut { missing } => {
                self.phase = BatchPhase::TimedOut;
                warn!(
                    "Batch {} timed out after {} ms, no completion from axes {:?}",
                    batch_no, elapsed_ms, missing
                );
                self.emit(RunEvent::BatchTimedOut {
                    batch_no,
                    missing: missing.clone(),
                    elapsed_ms,
                });
            }
        }

        Ok(BatchReport {
            outcome,
            acked: acked.into_iter().collect(),
            stray,
            elapsed,
        })
    }
}

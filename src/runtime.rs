// Send worker with pub/sub progress reporting
//
// The blocking pipeline runs on one dedicated worker that owns the bus
// handle and all per-axis state for the duration of a run. This side pumps
// the worker's events to the event topic, mirrors its condition on the
// health topic, and flips the shared abort flag on Ctrl-C or an abort
// message. The flag is honored between batches, never mid-handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{RigConfig, TOPIC_ABORT, TOPIC_EVENTS, TOPIC_HEALTH};
use crate::gcode::Converter;
use crate::messages::{RunEvent, RunHealth, RunSummary};
use crate::motor::bus::Bus;
use crate::motor::driver::{AckPolicy, MotorDriver};
use crate::motor::protocol::MoveBatch;

pub type ShellError = Box<dyn std::error::Error + Send + Sync>;

/// Convert a whole move program into frame-file lines (no bus involved)
pub fn convert_program(config: &RigConfig, input: &str) -> Vec<String> {
    let mut converter = Converter::new(config);
    let lines: Vec<String> = converter
        .convert_program(input.lines())
        .iter()
        .flat_map(|batch| batch.frames().iter().map(|frame| frame.to_hex_line()))
        .collect();
    info!(
        "Converted {} moves, {} lines skipped",
        converter.moves(),
        converter.skipped()
    );
    lines
}

/// Send every batch over the injected bus, publishing progress while the
/// worker runs. Returns the run totals; transport failures surface as errors.
pub async fn run_send(
    config: RigConfig,
    batches: Vec<MoveBatch>,
    bus: Box<dyn Bus + Send>,
) -> Result<RunSummary, ShellError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_events = session.declare_publisher(TOPIC_EVENTS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let sub_abort = session.declare_subscriber(TOPIC_ABORT).await?;

    let abort = Arc::new(AtomicBool::new(false));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let policy = AckPolicy {
        receive_timeout: config.receive_timeout(),
        batch_budget: config.batch_budget(),
    };
    let speed_sync = config.speed_sync;

    info!(
        "Sending {} batches, ack axes {:?}, batch budget {} ms",
        batches.len(),
        config.ack_axes,
        config.batch_budget_ms
    );
    info!("Publishing to: {}, {}", TOPIC_EVENTS, TOPIC_HEALTH);
    info!("Subscribed to: {}", TOPIC_ABORT);

    let worker_abort = abort.clone();
    let worker_tx = events_tx.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let mut driver = MotorDriver::new(bus)
            .with_policy(policy)
            .with_speed_sync(speed_sync)
            .with_events(events_tx);
        let mut batches = batches;
        let result = driver.run(&mut batches, &worker_abort);
        match &result {
            Ok(summary) => {
                let _ = worker_tx.send(RunEvent::RunFinished { summary: *summary });
            }
            Err(e) => {
                let _ = worker_tx.send(RunEvent::TransportFailed {
                    message: e.to_string(),
                });
            }
        }
        result
    });

    let mut health = RunHealth::Ok;
    publish_health(&pub_health, health).await?;

    // Pump events until the worker drops its end of the channel
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                pub_events.put(serde_json::to_string(&event)?).await?;
                if let Some(hint) = event.health_hint() {
                    if hint != health {
                        health = hint;
                        publish_health(&pub_health, health).await?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, aborting after the current batch");
                abort.store(true, Ordering::Relaxed);
            }
            sample = sub_abort.recv_async() => {
                if sample.is_ok() {
                    warn!("Abort requested over {}", TOPIC_ABORT);
                    abort.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    let summary = worker.await??;
    Ok(summary)
}

async fn publish_health(
    publisher: &zenoh::pubsub::Publisher<'_>,
    health: RunHealth,
) -> Result<(), ShellError> {
    publisher.put(serde_json::to_string(&health)?).await?;
    Ok(())
}

// Event monitor: subscribes to the runtime's event and health topics and
// pretty-prints everything it sees. Stands in for an external control
// surface watching a run from another process.
//
// Usage: cargo run --example event_monitor

use tracing::{info, warn};

use hexarm_can_runtime::config::{TOPIC_EVENTS, TOPIC_HEALTH};
use hexarm_can_runtime::messages::{RunEvent, RunHealth};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let sub_events = session.declare_subscriber(TOPIC_EVENTS).await?;
    let sub_health = session.declare_subscriber(TOPIC_HEALTH).await?;
    info!("Listening on {} and {}", TOPIC_EVENTS, TOPIC_HEALTH);

    loop {
        tokio::select! {
            sample = sub_events.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<RunEvent>(&payload) {
                    Ok(event) => print_event(&event),
                    Err(e) => warn!("Unparseable event: {}", e),
                }
            }
            sample = sub_health.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<RunHealth>(&payload) {
                    Ok(health) => println!("health: {:?}", health),
                    Err(e) => warn!("Unparseable health: {}", e),
                }
            }
        }
    }
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::SpeedChanged { line_no, speed } => {
            println!("line {line_no}: carried speed -> {speed}");
        }
        RunEvent::LineSkipped { line_no, reason } => {
            println!("line {line_no}: skipped ({reason})");
        }
        RunEvent::BatchSending { batch_no, frames } => {
            println!("batch {batch_no}: sending {frames} frames");
        }
        RunEvent::FrameSent { batch_no, axis_id, hex, delta } => {
            println!(
                "batch {batch_no}: axis {axis_id} -> {hex} ({:+.2} units)",
                f64::from(*delta) / 100.0
            );
        }
        RunEvent::BatchComplete { batch_no, elapsed_ms } => {
            println!("batch {batch_no}: complete in {elapsed_ms} ms");
        }
        RunEvent::BatchTimedOut { batch_no, missing, elapsed_ms } => {
            println!("batch {batch_no}: TIMED OUT after {elapsed_ms} ms, no ack from {missing:?}");
        }
        RunEvent::StrayResponse { batch_no, axis_id, status_code } => {
            println!("batch {batch_no}: stray response from axis {axis_id} (status 0x{status_code:02X})");
        }
        RunEvent::TransportFailed { message } => {
            println!("TRANSPORT FAILURE: {message}");
        }
        RunEvent::RunAborted { batches_sent } => {
            println!("run aborted after {batches_sent} batches");
        }
        RunEvent::RunFinished { summary } => {
            println!(
                "run finished: {} sent, {} complete, {} timed out",
                summary.batches_sent, summary.completed, summary.timed_out
            );
        }
    }
}

// Simulated end-to-end run: converts a short program and sends it over a
// SimBus where axis 2 never acknowledges, showing the timeout-and-continue
// path without any hardware.
//
// Usage: cargo run --example sim_run

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use hexarm_can_runtime::config::RigConfig;
use hexarm_can_runtime::gcode::Converter;
use hexarm_can_runtime::motor::bus::SimBus;
use hexarm_can_runtime::motor::driver::{AckPolicy, MotorDriver};

const SAMPLE_PROGRAM: &[&str] = &[
    "F400",
    "G90 X5.0 Y5.0 Z0 A0 B0 C0",
    "G90 X10.0 Y10.0 Z0 A0 B0 C0",
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let config = RigConfig::default();
    let mut converter = Converter::new(&config);
    let mut batches = converter.convert_program(SAMPLE_PROGRAM.iter().copied());
    println!("Converted {} moves, sending with axis 2 silent...", batches.len());

    // Only axis 1 responds; the configured ack set is {1, 2}, so every batch
    // runs out its budget and the run continues anyway
    let bus = SimBus::acking(&[1]).with_latency(Duration::from_millis(20));
    let mut driver = MotorDriver::new(bus).with_policy(AckPolicy {
        receive_timeout: Duration::from_millis(50),
        batch_budget: Duration::from_millis(500),
    });

    let abort = AtomicBool::new(false);
    match driver.run(&mut batches, &abort) {
        Ok(summary) => {
            println!();
            println!(
                "Done: {} batches sent, {} complete, {} timed out",
                summary.batches_sent, summary.completed, summary.timed_out
            );
        }
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}

// Frame dump: convert a built-in sample program and print every frame with
// its decoded fields. Read-only, no bus attached.
//
// Usage: cargo run --example frame_dump

use hexarm_can_runtime::config::RigConfig;
use hexarm_can_runtime::gcode::Converter;

const SAMPLE_PROGRAM: &[&str] = &[
    "F500",
    "G90 X10.0 Y20.0 Z0.0 A0.0 B0.0 C0.0",
    "G90 X12.5 Y18.0 Z-1.0 A0.0 B0.0 C0.0 F750",
    "G90 X0 Y0",
    "G90 X0 Y0 Z0 A0 B0 C0",
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = RigConfig::default();
    let mut converter = Converter::new(&config);

    for (move_no, batch) in converter
        .convert_program(SAMPLE_PROGRAM.iter().copied())
        .iter()
        .enumerate()
    {
        let expected: Vec<u8> = batch.expected_acks().iter().copied().collect();
        println!("Move {} (awaits acks from {:?}):", move_no + 1, expected);
        for frame in batch.frames() {
            println!(
                "  axis {}  {}  speed={:4}  delta={:+9.2} units",
                frame.axis_id,
                frame.to_hex_line(),
                frame.speed,
                f64::from(frame.position_delta) / 100.0
            );
        }
    }

    println!();
    println!("Last commanded positions (device units):");
    for axis_id in 1..=6u8 {
        let axis = converter.rig().axis(axis_id);
        println!("  axis {}: {:8.2}", axis_id, axis.last_commanded_position);
    }

    println!();
    println!(
        "{} moves converted, {} lines skipped",
        converter.moves(),
        converter.skipped()
    );
}

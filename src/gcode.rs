// Move-file ingestion
//
// Line-oriented `.tap` parsing. An `F<digits>` token on any line updates the
// carried speed; lines starting with the absolute-coordinate marker `G90`
// are coordinated moves. All numeric tokens on a move line are extracted in
// order, the first (the mode number) is discarded and the next six become
// the targets for axes 1..=6. Lines without six recoverable positions are
// skipped, not fatal.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::RigConfig;
use crate::messages::RunEvent;
use crate::motor::kinematics::{AXIS_COUNT, Rig};
use crate::motor::protocol::{Frame, MoveBatch};

/// Marker token opening a coordinated move line
const MOVE_MARKER: &str = "G90";

/// One per-axis slice of a coordinated move, consumed as soon as it is built
#[derive(Debug, Clone, Copy)]
pub struct MotionCommand {
    pub axis_id: u8,
    pub target_position: f64,
    pub commanded_speed: u16,
}

/// Speed token found on a line
enum SpeedToken {
    None,
    Value(u16),
    Malformed,
}

/// Converts move lines into frame batches, carrying per-axis state and the
/// most recent speed across lines
pub struct Converter {
    rig: Rig,
    ack_axes: Vec<u8>,
    carried_speed: u16,
    line_no: usize,
    moves: usize,
    skipped: usize,
    events: Option<UnboundedSender<RunEvent>>,
}

impl Converter {
    pub fn new(config: &RigConfig) -> Self {
        Self {
            rig: config.rig(),
            ack_axes: config.ack_axes.clone(),
            carried_speed: 0,
            line_no: 0,
            moves: 0,
            skipped: 0,
            events: None,
        }
    }

    /// Attach a progress event channel
    pub fn with_events(mut self, events: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Process one input line. Returns a batch for an accepted move line,
    /// `None` for anything else (speed-only lines, comments, skipped lines).
    pub fn convert_line(&mut self, line: &str) -> Option<MoveBatch> {
        self.line_no += 1;
        let line = line.trim();

        // The speed token is picked up first so an F on a move line applies
        // to that same move
        match scan_speed(line) {
            SpeedToken::None => {}
            SpeedToken::Value(speed) => {
                if speed != self.carried_speed {
                    debug!("Line {}: carried speed set to {}", self.line_no, speed);
                    self.emit(RunEvent::SpeedChanged {
                        line_no: self.line_no,
                        speed,
                    });
                }
                self.carried_speed = speed;
            }
            SpeedToken::Malformed => {
                warn!(
                    "Line {}: unreadable F token, keeping speed {}",
                    self.line_no, self.carried_speed
                );
            }
        }

        if !line.starts_with(MOVE_MARKER) {
            return None;
        }

        let numbers = extract_numbers(line);
        if numbers.len() < 1 + AXIS_COUNT {
            warn!(
                "Line {}: move line has {} of {} positions, skipping",
                self.line_no,
                numbers.len().saturating_sub(1),
                AXIS_COUNT
            );
            self.skipped += 1;
            self.emit(RunEvent::LineSkipped {
                line_no: self.line_no,
                reason: format!(
                    "move line has {} of {} positions",
                    numbers.len().saturating_sub(1),
                    AXIS_COUNT
                ),
            });
            return None;
        }

        let frames = numbers[1..=AXIS_COUNT]
            .iter()
            .enumerate()
            .map(|(index, &target_position)| {
                let command = MotionCommand {
                    axis_id: index as u8 + 1,
                    target_position,
                    commanded_speed: self.carried_speed,
                };
                let delta = self.rig.transform(command.axis_id, command.target_position);
                Frame::move_command(command.axis_id, command.commanded_speed, delta)
            })
            .collect();

        self.moves += 1;
        Some(MoveBatch::new(frames, &self.ack_axes))
    }

    /// Convert a whole program, yielding one batch per accepted move line
    pub fn convert_program<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> Vec<MoveBatch> {
        lines
            .into_iter()
            .filter_map(|line| self.convert_line(line))
            .collect()
    }

    /// Move lines accepted so far
    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Move lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn carried_speed(&self) -> u16 {
        self.carried_speed
    }

    /// Diagnostics view of the per-axis state
    pub fn rig(&self) -> &Rig {
        &self.rig
    }
}

/// Read a pre-encoded frame file into batches. Frames are grouped by their
/// six-line windows as written by the converter; a trailing short window is
/// still a batch, undecodable lines are skipped and logged.
pub fn read_frame_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    ack_axes: &[u8],
) -> Vec<MoveBatch> {
    let lines: Vec<&str> = lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines
        .chunks(AXIS_COUNT)
        .enumerate()
        .map(|(window, chunk)| {
            let frames: Vec<Frame> = chunk
                .iter()
                .filter_map(|line| match Frame::from_hex_line(line) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("Frame window {}: skipping line {:?}: {}", window + 1, line, e);
                        None
                    }
                })
                .collect();
            MoveBatch::new(frames, ack_axes)
        })
        .filter(|batch| !batch.is_empty())
        .collect()
}

/// First `F<digits>` token on the line, if any
fn scan_speed(line: &str) -> SpeedToken {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'F' {
            continue;
        }
        let digits: String = line[i + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            continue;
        }
        return match digits.parse::<u16>() {
            Ok(speed) => SpeedToken::Value(speed),
            Err(_) => SpeedToken::Malformed,
        };
    }
    SpeedToken::None
}

/// Every signed integer or decimal token on the line, left to right
fn extract_numbers(line: &str) -> Vec<f64> {
    let bytes = line.as_bytes();
    let mut numbers = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !starts_number(bytes, i) {
            i += 1;
            continue;
        }
        let start = i;
        if bytes[i] == b'+' || bytes[i] == b'-' {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        // A decimal point only counts with digits behind it
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if let Ok(value) = line[start..i].parse::<f64>() {
            numbers.push(value);
        }
    }
    numbers
}

/// Does a numeric token begin at `i`?
fn starts_number(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'0'..=b'9' => true,
        b'.' => i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit(),
        b'+' | b'-' => i + 1 < bytes.len() && starts_number(bytes, i + 1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> Converter {
        Converter::new(&RigConfig::default())
    }

    #[test]
    fn test_extract_numbers() {
        assert_eq!(
            extract_numbers("G90 X10.5 Y-2 Z+0.25 A.5 B3 C0"),
            vec![90.0, 10.5, -2.0, 0.25, 0.5, 3.0, 0.0]
        );
        assert!(extract_numbers("no numbers here").is_empty());
    }

    #[test]
    fn test_speed_token_updates_carried_speed() {
        let mut c = converter();
        assert!(c.convert_line("F500").is_none(), "speed-only line yields no batch");
        assert_eq!(c.carried_speed(), 500);
    }

    #[test]
    fn test_malformed_speed_keeps_previous() {
        let mut c = converter();
        c.convert_line("F500");
        // Does not fit 16 bits: token ignored, file continues
        c.convert_line("F99999");
        assert_eq!(c.carried_speed(), 500);
    }

    #[test]
    fn test_golden_conversion() {
        // Gear ratios [0.5, 0.5, 1, 1, 1, 1], speed 500, no inversion
        let mut c = converter();
        let batches = c.convert_program(["F500", "G90 X10.0 Y20.0 Z0.0 A0.0 B0.0 C0.0"]);

        assert_eq!(batches.len(), 1);
        let hex: Vec<String> = batches[0].frames().iter().map(|f| f.to_hex_line()).collect();
        assert_eq!(hex[0], "01F501F4020001F4E2");
        assert_eq!(hex[1], "02F501F4020003E8D9");
        assert_eq!(hex[2], "03F501F402000000EF");
        assert_eq!(batches[0].len(), AXIS_COUNT);

        let expected: Vec<u8> = batches[0].expected_acks().iter().copied().collect();
        assert_eq!(expected, vec![1, 2], "default ack subset");
    }

    #[test]
    fn test_speed_on_move_line_applies_to_same_move() {
        let mut c = converter();
        let batch = c
            .convert_line("G90 X10.0 Y20.0 Z0.0 A0.0 B0.0 C0.0 F500")
            .unwrap();
        assert!(batch.frames().iter().all(|f| f.speed == 500));
        // The trailing 500 is the eighth number and must not become a position
        assert_eq!(batch.frames()[0].position_delta, 500);
        assert_eq!(batch.frames()[5].position_delta, 0);
    }

    #[test]
    fn test_speed_carries_across_lines() {
        let mut c = converter();
        let batches = c.convert_program([
            "F250",
            "M3",
            "G90 X0 Y0 Z1.0 A0 B0 C0",
        ]);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].frames().iter().all(|f| f.speed == 250));
    }

    #[test]
    fn test_short_move_line_is_skipped() {
        let mut c = converter();
        assert!(c.convert_line("G90 X10 Y20").is_none());
        assert_eq!(c.skipped(), 1);
        assert_eq!(c.moves(), 0);
    }

    #[test]
    fn test_non_move_lines_are_ignored() {
        let mut c = converter();
        assert!(c.convert_line("M3 S1000").is_none());
        assert!(c.convert_line("; comment").is_none());
        assert!(c.convert_line("").is_none());
        assert_eq!(c.skipped(), 0);
    }

    #[test]
    fn test_extra_positions_are_ignored() {
        let mut c = converter();
        c.convert_line("F100");
        let batch = c
            .convert_line("G90 X1 Y2 Z3 A4 B5 C6 D7 E8")
            .unwrap();
        assert_eq!(batch.len(), AXIS_COUNT);
        // Axis 1 has gear ratio 0.5: 1.0 * 0.5 * 100 = 50
        assert_eq!(batch.frames()[0].position_delta, 50);
        assert_eq!(batch.frames()[5].position_delta, 600);
    }

    #[test]
    fn test_inverted_axis_flips_delta() {
        let mut config = RigConfig::default();
        config.axes[0].invert_direction = true;
        let mut c = Converter::new(&config);
        c.convert_line("F500");
        let batch = c
            .convert_line("G90 X10.0 Y20.0 Z0.0 A0.0 B0.0 C0.0")
            .unwrap();
        assert_eq!(batch.frames()[0].position_delta, -500);
        assert_eq!(batch.frames()[1].position_delta, 1000, "other axes unaffected");
    }

    #[test]
    fn test_deltas_repeat_against_fixed_reference() {
        let mut c = converter();
        c.convert_line("F500");
        let first = c.convert_line("G90 X10.0 Y0 Z0 A0 B0 C0").unwrap();
        let second = c.convert_line("G90 X10.0 Y0 Z0 A0 B0 C0").unwrap();
        assert_eq!(
            first.frames()[0].position_delta,
            second.frames()[0].position_delta,
            "reference position does not advance between moves"
        );
    }

    #[test]
    fn test_read_frame_lines_groups_in_sixes() {
        let mut c = converter();
        c.convert_line("F500");
        let batch_a = c.convert_line("G90 X10.0 Y20.0 Z0 A0 B0 C0").unwrap();
        let batch_b = c.convert_line("G90 X1 Y1 Z1 A1 B1 C1").unwrap();

        let mut lines: Vec<String> = Vec::new();
        for batch in [&batch_a, &batch_b] {
            lines.extend(batch.frames().iter().map(|f| f.to_hex_line()));
        }
        // Drop one line of the second move: the trailing window still batches
        lines.truncate(11);

        let batches = read_frame_lines(lines.iter().map(String::as_str), &[1, 2]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 6);
        assert_eq!(batches[1].len(), 5);
        assert_eq!(batches[0].frames()[0], batch_a.frames()[0]);
    }

    #[test]
    fn test_converter_reports_progress_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut c = Converter::new(&RigConfig::default()).with_events(tx);
        c.convert_line("F500");
        c.convert_line("G90 X10 Y20");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events[0],
            RunEvent::SpeedChanged { line_no: 1, speed: 500 }
        ));
        assert!(matches!(events[1], RunEvent::LineSkipped { line_no: 2, .. }));
    }

    #[test]
    fn test_read_frame_lines_skips_garbage() {
        let lines = ["01F501F4020001F4E2", "not hex at all", "02F501F4020003E8D9"];
        let batches = read_frame_lines(lines, &[1, 2]);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }
}

// Axis controller CAN frame codec
//
// Command frame layout (9 bytes, big-endian multi-byte fields):
// [axis_id, function, speed_hi, speed_lo, sub_code, delta_hi, delta_mid, delta_lo, checksum]
// On the wire the axis id doubles as the arbitration id and the remaining
// 8 bytes are the payload. Checksum is the low byte of the sum of the 8
// preceding bytes.

use std::collections::BTreeSet;

/// Function code for a relative move command
pub const FUNC_RELATIVE_MOVE: u8 = 0xF5;

/// Sub-code carried by every move frame (controller acceleration profile)
pub const SUB_CODE_MOVE: u8 = 0x02;

/// Full frame length in bytes (payload + arbitration byte)
pub const FRAME_LEN: usize = 9;

/// Payload length on the wire (frame minus the arbitration byte)
pub const PAYLOAD_LEN: usize = 8;

/// Range of a signed 24-bit position delta
pub const DELTA_MIN: i32 = -8_388_608;
pub const DELTA_MAX: i32 = 8_388_607;

/// Move status reported by an axis controller in the first response byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    /// Command rejected or motor stalled
    Failed = 0x00,
    /// Move accepted, motor running
    Running = 0x01,
    /// Move complete
    Complete = 0x02,
    /// Motor stopped by an end limit
    LimitStop = 0x03,
}

impl MoveStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(MoveStatus::Failed),
            0x01 => Some(MoveStatus::Running),
            0x02 => Some(MoveStatus::Complete),
            0x03 => Some(MoveStatus::LimitStop),
            _ => None,
        }
    }
}

/// Decode errors for command and response frames
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: expected at least {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Invalid hex in frame line: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Empty response payload from axis {axis_id}")]
    EmptyResponse { axis_id: u8 },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Low byte of the plain byte sum
fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| u32::from(b)).sum();
    (sum & 0xFF) as u8
}

/// Truncate to a signed 24-bit value, wrapping via two's complement.
/// Out-of-range deltas wrap silently; the controller has no wider field.
fn to_i24(delta: i64) -> i32 {
    let raw = (delta as u32) & 0xFF_FFFF;
    if raw & 0x80_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// One axis command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub axis_id: u8,
    pub function_code: u8,
    pub speed: u16,
    pub sub_code: u8,
    /// Signed 24-bit position delta in hundredths of a unit
    pub position_delta: i32,
    pub checksum: u8,
}

impl Frame {
    /// Build a frame, truncating the delta to 24 bits and appending the checksum
    pub fn encode(axis_id: u8, function_code: u8, speed: u16, sub_code: u8, delta: i64) -> Self {
        let position_delta = to_i24(delta);
        let mut frame = Self {
            axis_id,
            function_code,
            speed,
            sub_code,
            position_delta,
            checksum: 0,
        };
        frame.checksum = checksum(&frame.to_bytes()[..FRAME_LEN - 1]);
        frame
    }

    /// Build a relative move frame with the fixed function and sub codes
    pub fn move_command(axis_id: u8, speed: u16, delta: i64) -> Self {
        Self::encode(axis_id, FUNC_RELATIVE_MOVE, speed, SUB_CODE_MOVE, delta)
    }

    /// Parse a frame from raw bytes. The checksum byte is read as-is;
    /// verification is the caller's decision (see [`Frame::verify_checksum`]).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_LEN {
            return Err(DecodeError::MalformedFrame {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }
        let delta_raw =
            (i64::from(bytes[5]) << 16) | (i64::from(bytes[6]) << 8) | i64::from(bytes[7]);
        Ok(Self {
            axis_id: bytes[0],
            function_code: bytes[1],
            speed: u16::from_be_bytes([bytes[2], bytes[3]]),
            sub_code: bytes[4],
            position_delta: to_i24(delta_raw),
            checksum: bytes[8],
        })
    }

    /// Serialize to the 9-byte wire layout
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let speed = self.speed.to_be_bytes();
        let delta = (self.position_delta as u32) & 0xFF_FFFF;
        [
            self.axis_id,
            self.function_code,
            speed[0],
            speed[1],
            self.sub_code,
            (delta >> 16) as u8,
            (delta >> 8) as u8,
            delta as u8,
            self.checksum,
        ]
    }

    /// Replace the speed field, refreshing the checksum
    pub fn set_speed(&mut self, speed: u16) {
        *self = Self::encode(
            self.axis_id,
            self.function_code,
            speed,
            self.sub_code,
            i64::from(self.position_delta),
        );
    }

    /// Split into arbitration id and 8-byte payload for the bus
    pub fn to_wire(&self) -> (u32, [u8; PAYLOAD_LEN]) {
        let bytes = self.to_bytes();
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[1..]);
        (u32::from(self.axis_id), payload)
    }

    /// Check the stored checksum against the preceding bytes
    pub fn verify_checksum(&self) -> bool {
        let bytes = self.to_bytes();
        checksum(&bytes[..FRAME_LEN - 1]) == self.checksum
    }

    /// Format as one frame-file line: 18 upper-case hex characters
    pub fn to_hex_line(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }

    /// Parse a frame-file line. Whitespace between byte pairs is tolerated.
    pub fn from_hex_line(line: &str) -> Result<Self> {
        let compact: String = line.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = hex::decode(&compact)?;
        Self::decode(&bytes)
    }
}

/// One acknowledgement frame from an axis controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    pub axis_id: u8,
    pub status_code: u8,
}

impl ResponseFrame {
    /// Interpret an inbound frame: arbitration id names the axis, the first
    /// payload byte is the status code.
    pub fn from_wire(arbitration_id: u32, payload: &[u8]) -> Result<Self> {
        let axis_id = (arbitration_id & 0xFF) as u8;
        let Some(&status_code) = payload.first() else {
            return Err(DecodeError::EmptyResponse { axis_id });
        };
        Ok(Self {
            axis_id,
            status_code,
        })
    }

    pub fn status(&self) -> Option<MoveStatus> {
        MoveStatus::from_raw(self.status_code)
    }

    pub fn is_complete(&self) -> bool {
        self.status() == Some(MoveStatus::Complete)
    }
}

/// The frames of one coordinated move plus the axes expected to acknowledge it
#[derive(Debug, Clone)]
pub struct MoveBatch {
    frames: Vec<Frame>,
    expected_acks: BTreeSet<u8>,
}

impl MoveBatch {
    /// Build a batch from per-axis frames. Frames are kept in ascending axis
    /// order (the transmit order guarantee) and the expected-acknowledger set
    /// is the configured subset narrowed to the axes actually present.
    pub fn new(mut frames: Vec<Frame>, ack_subset: &[u8]) -> Self {
        frames.sort_by_key(|f| f.axis_id);
        let present: BTreeSet<u8> = frames.iter().map(|f| f.axis_id).collect();
        let expected_acks = ack_subset
            .iter()
            .copied()
            .filter(|id| present.contains(id))
            .collect();
        Self {
            frames,
            expected_acks,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn expected_acks(&self) -> &BTreeSet<u8> {
        &self.expected_acks
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_low_byte_of_sum() {
        // 0x01 + 0xF5 + 0x01 + 0xF4 + 0x02 + 0x00 + 0x01 + 0xF4 = 0x2E2
        let frame = Frame::move_command(1, 500, 500);
        assert_eq!(frame.checksum, 0xE2);
        assert!(frame.verify_checksum());
    }

    #[test]
    fn test_known_frames() {
        // Golden frames for gear ratio 0.5, speed 500, targets 10.0 / 20.0 / 0.0
        assert_eq!(Frame::move_command(1, 500, 500).to_hex_line(), "01F501F4020001F4E2");
        assert_eq!(Frame::move_command(2, 500, 1000).to_hex_line(), "02F501F4020003E8D9");
        assert_eq!(Frame::move_command(3, 500, 0).to_hex_line(), "03F501F402000000EF");
    }

    #[test]
    fn test_roundtrip() {
        let frame = Frame::move_command(4, 1200, -32_000);
        let decoded = Frame::decode(&frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.speed, 1200);
        assert_eq!(decoded.position_delta, -32_000);
    }

    #[test]
    fn test_negative_delta_encoding() {
        // -500 as 24-bit two's complement = 0xFFFE0C
        let frame = Frame::move_command(1, 500, -500);
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[5..8], &[0xFF, 0xFE, 0x0C]);
        assert_eq!(Frame::decode(&bytes).unwrap().position_delta, -500);
    }

    #[test]
    fn test_delta_wraps_at_24_bits() {
        // One past DELTA_MAX wraps to DELTA_MIN
        let wrapped = Frame::move_command(1, 500, i64::from(DELTA_MAX) + 1);
        let min = Frame::move_command(1, 500, i64::from(DELTA_MIN));
        assert_eq!(wrapped.position_delta, DELTA_MIN);
        assert_eq!(wrapped.to_bytes(), min.to_bytes());
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let err = Frame::decode(&[0x01, 0xF5, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedFrame {
                expected: FRAME_LEN,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_decode_does_not_verify_checksum() {
        let mut bytes = Frame::move_command(1, 500, 500).to_bytes();
        bytes[8] = bytes[8].wrapping_add(1);
        let frame = Frame::decode(&bytes).unwrap();
        assert!(!frame.verify_checksum(), "corrupted checksum should fail verify");
    }

    #[test]
    fn test_hex_line_roundtrip_with_spaces() {
        let frame = Frame::move_command(5, 800, 12_345);
        let line = frame.to_hex_line();
        assert_eq!(line.len(), 18);
        assert_eq!(Frame::from_hex_line(&line).unwrap(), frame);

        // The sender historically accepted space-separated byte pairs
        let spaced = "01F5 01F4 02 0001F4 E2";
        assert_eq!(
            Frame::from_hex_line(spaced).unwrap(),
            Frame::move_command(1, 500, 500)
        );
    }

    #[test]
    fn test_set_speed_refreshes_checksum() {
        let mut frame = Frame::move_command(1, 500, 500);
        frame.set_speed(250);
        assert_eq!(frame.speed, 250);
        assert!(frame.verify_checksum(), "checksum must track the new speed");
        assert_eq!(frame.position_delta, 500);
    }

    #[test]
    fn test_wire_split() {
        let frame = Frame::move_command(2, 500, 1000);
        let (id, payload) = frame.to_wire();
        assert_eq!(id, 2);
        assert_eq!(payload, [0xF5, 0x01, 0xF4, 0x02, 0x00, 0x03, 0xE8, 0xD9]);
    }

    #[test]
    fn test_response_status() {
        let ack = ResponseFrame::from_wire(1, &[0x02, 0x00]).unwrap();
        assert!(ack.is_complete());
        assert_eq!(ack.status(), Some(MoveStatus::Complete));

        let running = ResponseFrame::from_wire(2, &[0x01]).unwrap();
        assert!(!running.is_complete());

        let unknown = ResponseFrame::from_wire(3, &[0x7F]).unwrap();
        assert_eq!(unknown.status(), None);

        assert!(ResponseFrame::from_wire(4, &[]).is_err());
    }

    #[test]
    fn test_batch_orders_frames_and_narrows_acks() {
        let frames = vec![
            Frame::move_command(3, 500, 0),
            Frame::move_command(1, 500, 500),
            Frame::move_command(2, 500, 1000),
        ];
        let batch = MoveBatch::new(frames, &[1, 2]);

        let order: Vec<u8> = batch.frames().iter().map(|f| f.axis_id).collect();
        assert_eq!(order, vec![1, 2, 3], "frames must transmit in ascending axis order");

        let expected: Vec<u8> = batch.expected_acks().iter().copied().collect();
        assert_eq!(expected, vec![1, 2]);
    }

    #[test]
    fn test_batch_ack_subset_ignores_absent_axes() {
        let frames = vec![Frame::move_command(3, 500, 0)];
        let batch = MoveBatch::new(frames, &[1, 2]);
        assert!(
            batch.expected_acks().is_empty(),
            "axes not in the batch cannot be expected to acknowledge"
        );
    }
}

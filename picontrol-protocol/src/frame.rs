//! Frame encoding and decoding for the module link.
//!
//! Frame format:
//! - START (1 byte): 0xAA synchronization byte
//! - COMMAND (1 byte): command identifier
//! - LENGTH (2 bytes, little-endian): payload length (0-2048)
//! - PAYLOAD (LENGTH bytes): command-specific data
//! - CHECKSUM (1 byte): sum of every preceding byte, modulo 256

use heapless::Vec;

use crate::command::CommandId;

/// Frame synchronization byte
pub const FRAME_START: u8 = 0xAA;

/// Maximum payload size in bytes
///
/// Large enough for a full module descriptor with 32 parameters.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// START + COMMAND + LENGTH
pub const HEADER_SIZE: usize = 4;

/// Bytes a frame adds around its payload
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

/// Maximum complete frame size
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + MAX_PAYLOAD_SIZE;

/// Inter-byte gap after which a partial frame is abandoned
pub const PARSER_TIMEOUT_MS: u32 = 50;

/// Errors that can occur during frame parsing or payload decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Checksum mismatch
    InvalidChecksum,
    /// Payload shorter than its layout requires
    Truncated,
    /// Invalid frame or payload structure
    InvalidFrame,
}

/// A parsed or constructed frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    /// Command identifier
    pub command: CommandId,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a new frame with the given command and payload
    pub fn new(command: CommandId, payload: &[u8]) -> Result<Self, FrameError> {
        let payload = Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self { command, payload })
    }

    /// Create a frame with no payload
    pub fn empty(command: CommandId) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Encode this frame into wire bytes
    pub fn to_bytes(&self) -> Vec<u8, MAX_FRAME_SIZE> {
        encode(self.command, &self.payload)
    }
}

/// Sum of all bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Encode a command and payload into wire bytes
///
/// Payloads longer than [`MAX_PAYLOAD_SIZE`] are truncated with a warning.
pub fn encode(command: CommandId, payload: &[u8]) -> Vec<u8, MAX_FRAME_SIZE> {
    let payload = if payload.len() > MAX_PAYLOAD_SIZE {
        warn!(
            "payload of {} bytes truncated to {}",
            payload.len(),
            MAX_PAYLOAD_SIZE
        );
        &payload[..MAX_PAYLOAD_SIZE]
    } else {
        payload
    };

    // Every write below fits: the buffer is sized for the largest payload.
    let mut out = Vec::new();
    let _ = out.push(FRAME_START);
    let _ = out.push(command.to_byte());
    let _ = out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    let _ = out.extend_from_slice(payload);
    let sum = checksum(&out);
    let _ = out.push(sum);
    out
}

/// Byte-at-a-time frame decoder
///
/// One instance per slot. `feed` never blocks and never allocates, so it
/// can be driven straight from the receive interrupt.
#[derive(Debug, Clone)]
pub struct FrameParser {
    buffer: Vec<u8, MAX_FRAME_SIZE>,
    expected_length: usize,
    syncing: bool,
    last_byte_ms: u32,
    timeout_ms: u32,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a new frame parser
    pub const fn new() -> Self {
        Self::with_timeout(PARSER_TIMEOUT_MS)
    }

    /// Create a parser with a custom inter-byte timeout
    pub const fn with_timeout(timeout_ms: u32) -> Self {
        Self {
            buffer: Vec::new(),
            expected_length: 0,
            syncing: false,
            last_byte_ms: 0,
            timeout_ms,
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_length = 0;
        self.syncing = false;
    }

    /// Whether a partial frame is buffered
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    /// Feed a single byte received at `now_ms`
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` when the buffered
    /// bytes were discarded. The parser is always ready for the next byte.
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> Result<Option<Frame>, FrameError> {
        if self.syncing && now_ms.wrapping_sub(self.last_byte_ms) > self.timeout_ms {
            trace!(
                "partial frame timed out, dropping {} bytes",
                self.buffer.len()
            );
            self.reset();
        }
        self.last_byte_ms = now_ms;

        if !self.syncing {
            // Silently ignore non-START bytes while waiting
            if byte == FRAME_START {
                self.buffer.clear();
                let _ = self.buffer.push(byte);
                self.syncing = true;
            }
            return Ok(None);
        }

        if self.buffer.push(byte).is_err() {
            self.reset();
            return Err(FrameError::PayloadTooLarge);
        }

        if self.buffer.len() == HEADER_SIZE {
            let declared = u16::from_le_bytes([self.buffer[2], self.buffer[3]]) as usize;
            if declared > MAX_PAYLOAD_SIZE {
                debug!("declared payload {} too large, resyncing", declared);
                self.reset();
                return Err(FrameError::PayloadTooLarge);
            }
            self.expected_length = FRAME_OVERHEAD + declared;
        }

        if self.expected_length == 0 || self.buffer.len() < self.expected_length {
            return Ok(None);
        }

        let (body, sum) = self.buffer.split_at(self.expected_length - 1);
        if checksum(body) != sum[0] {
            trace!("checksum mismatch, resyncing");
            self.reset();
            return Err(FrameError::InvalidChecksum);
        }

        let frame = Frame::new(
            CommandId::from_byte(self.buffer[1]),
            &self.buffer[HEADER_SIZE..self.expected_length - 1],
        );
        self.reset();
        frame.map(Some)
    }

    /// Feed multiple bytes received at `now_ms`
    ///
    /// Returns the first complete frame found, if any.
    /// Remaining bytes after a complete frame are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8], now_ms: u32) -> Result<Option<Frame>, FrameError> {
        for &byte in bytes {
            if let Some(frame) = self.feed(byte, now_ms)? {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::vec::Vec as StdVec;

    /// Feed everything, collecting every frame and ignoring resync errors
    fn collect(parser: &mut FrameParser, bytes: &[u8], now_ms: u32) -> StdVec<Frame> {
        bytes
            .iter()
            .filter_map(|&b| parser.feed(b, now_ms).ok().flatten())
            .collect()
    }

    #[test]
    fn test_frame_encode_empty_payload() {
        let bytes = Frame::empty(CommandId::Ping).to_bytes();

        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], FRAME_START);
        assert_eq!(bytes[1], 0x00); // command
        assert_eq!(bytes[2], 0); // length lo
        assert_eq!(bytes[3], 0); // length hi
        assert_eq!(bytes[4], 0xAA); // checksum
    }

    #[test]
    fn test_get_parameter_wire_bytes() {
        let bytes = encode(CommandId::GetParameter, &[0x2A]);
        assert_eq!(&bytes[..], &[0xAA, 0x03, 0x01, 0x00, 0x2A, 0xD8]);
    }

    #[test]
    fn test_decode_known_bytes() {
        let mut parser = FrameParser::new();
        let frame = parser
            .feed_bytes(&[0xAA, 0x03, 0x01, 0x00, 0x2A, 0xD8], 0)
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, CommandId::GetParameter);
        assert_eq!(&frame.payload[..], &[0x2A]);
    }

    #[test]
    fn test_decode_altered_checksum_drops_frame() {
        let mut parser = FrameParser::new();
        let result = parser.feed_bytes(&[0xAA, 0x03, 0x01, 0x00, 0x2A, 0xD9], 0);
        assert_eq!(result, Err(FrameError::InvalidChecksum));
        assert!(!parser.is_syncing());
    }

    #[test]
    fn test_frame_roundtrip() {
        let original = Frame::new(CommandId::SetParameter, &[1, 2, 3, 4, 5]).unwrap();
        let encoded = original.to_bytes();

        let mut parser = FrameParser::new();
        let parsed = parser.feed_bytes(&encoded, 0).unwrap().unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_unknown_command_decodes_as_unsupported() {
        let encoded = encode(CommandId::from_byte(0x42), &[]);
        let mut parser = FrameParser::new();
        let parsed = parser.feed_bytes(&encoded, 0).unwrap().unwrap();
        assert_eq!(parsed.command, CommandId::Unsupported(0x42));
    }

    #[test]
    fn test_encode_truncates_oversize_payload() {
        let big = [0x11u8; MAX_PAYLOAD_SIZE + 10];
        let encoded = encode(CommandId::SetMappings, &big);
        assert_eq!(encoded.len(), MAX_FRAME_SIZE);
        assert_eq!(
            u16::from_le_bytes([encoded[2], encoded[3]]) as usize,
            MAX_PAYLOAD_SIZE
        );

        let mut parser = FrameParser::new();
        let parsed = parser.feed_bytes(&encoded, 0).unwrap().unwrap();
        assert_eq!(parsed.payload.len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_oversize_declared_length_resyncs() {
        let mut parser = FrameParser::new();
        // 0x0900 = 2304 > MAX_PAYLOAD_SIZE
        let result = parser.feed_bytes(&[0xAA, 0x01, 0x00, 0x09], 0);
        assert_eq!(result, Err(FrameError::PayloadTooLarge));
        assert!(!parser.is_syncing());

        let good = encode(CommandId::Ping, &[0x55]);
        let frames = collect(&mut parser, &good, 1);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_timeout_discards_partial_frame() {
        let mut parser = FrameParser::new();
        // Header promising 3 bytes, then silence
        assert_eq!(parser.feed_bytes(&[0xAA, 0x02, 0x03, 0x00], 100), Ok(None));
        assert!(parser.is_syncing());

        let fresh = encode(CommandId::Ping, &[0x55]);
        let frames = collect(&mut parser, &fresh, 100 + PARSER_TIMEOUT_MS + 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, CommandId::Ping);
        assert_eq!(&frames[0].payload[..], &[0x55]);
    }

    #[test]
    fn test_no_timeout_within_window() {
        let mut parser = FrameParser::new();
        let encoded = encode(CommandId::GetParameter, &[7]);
        let (head, tail) = encoded.split_at(3);
        assert_eq!(parser.feed_bytes(head, 10), Ok(None));
        let frame = parser
            .feed_bytes(tail, 10 + PARSER_TIMEOUT_MS)
            .unwrap()
            .unwrap();
        assert_eq!(&frame.payload[..], &[7]);
    }

    #[test]
    fn test_timeout_across_clock_wrap() {
        let mut parser = FrameParser::new();
        let encoded = encode(CommandId::GetParameter, &[9]);
        let (head, tail) = encoded.split_at(2);
        assert_eq!(parser.feed_bytes(head, u32::MAX - 5), Ok(None));
        // 10 ms later across the wrap, still within the window
        let frame = parser.feed_bytes(tail, 4).unwrap().unwrap();
        assert_eq!(&frame.payload[..], &[9]);
    }

    #[test]
    fn test_parser_resync_after_garbage() {
        let encoded = encode(CommandId::Ping, &[0x55]);

        let mut data = StdVec::new();
        data.extend_from_slice(&[0x00, 0xFF, 0x12, 0x34]);
        data.extend_from_slice(&encoded);

        let mut parser = FrameParser::new();
        let frames = collect(&mut parser, &data, 0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, CommandId::Ping);
    }

    #[test]
    fn test_payload_too_large() {
        let large_payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        let result = Frame::new(CommandId::SetMappings, &large_payload);
        assert_eq!(result, Err(FrameError::PayloadTooLarge));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(cmd in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..300)) {
            let command = CommandId::from_byte(cmd);
            let encoded = encode(command, &payload);
            let mut parser = FrameParser::new();
            let frames = collect(&mut parser, &encoded, 0);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].command, command);
            prop_assert_eq!(&frames[0].payload[..], &payload[..]);
        }

        #[test]
        fn prop_resync_after_garbage(
            garbage in proptest::collection::vec(any::<u8>().prop_filter("no start byte", |b| *b != FRAME_START), 0..64),
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut data = garbage.clone();
            data.extend_from_slice(&encode(CommandId::GetParameter, &payload));
            let mut parser = FrameParser::new();
            let frames = collect(&mut parser, &data, 0);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0].payload[..], &payload[..]);
        }

        #[test]
        fn prop_partial_then_timeout(
            prefix_len in 1usize..6,
            payload in proptest::collection::vec(any::<u8>(), 4..32),
        ) {
            let stale = encode(CommandId::SetParameter, &payload);
            let fresh = encode(CommandId::GetParameter, &[1]);
            let mut parser = FrameParser::new();
            let mut frames = collect(&mut parser, &stale[..prefix_len], 0);
            frames.extend(collect(&mut parser, &fresh, PARSER_TIMEOUT_MS + 1));
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].command, CommandId::GetParameter);
        }
    }
}

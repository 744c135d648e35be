//! Mapping records exchanged with modules that store their own mappings
//!
//! Payload: `count(1)` followed by up to eight 20-byte records:
//! `param_id(1) action_type(1) curve(15) target(3)`, where the curve is
//! `count(1) points(4 x 2) controls(3 x 2)`.

use heapless::Vec;

use crate::frame::{FrameError, MAX_PAYLOAD_SIZE};

/// Maximum control points in a curve
pub const MAX_CURVE_POINTS: usize = 4;

/// Maximum records carried by one mapping payload
pub const MAX_MAPPING_RECORDS: usize = 8;

/// Size of the encoded curve
pub const CURVE_WIRE_SIZE: usize = 1 + MAX_CURVE_POINTS * 2 + (MAX_CURVE_POINTS - 1) * 2;

/// Size of one mapping record
pub const MAPPING_RECORD_SIZE: usize = 2 + CURVE_WIRE_SIZE + 3;

/// Curve as carried on the wire, unvalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WireCurve {
    pub count: u8,
    pub points: [(u8, u8); MAX_CURVE_POINTS],
    pub controls: [(u8, u8); MAX_CURVE_POINTS - 1],
}

impl WireCurve {
    fn write(&self, out: &mut [u8]) {
        out[0] = self.count;
        let pairs = self.points.iter().chain(self.controls.iter());
        for (i, (x, y)) in pairs.enumerate() {
            out[1 + i * 2] = *x;
            out[2 + i * 2] = *y;
        }
    }

    fn read(bytes: &[u8]) -> Self {
        let pair = |i: usize| (bytes[1 + i * 2], bytes[2 + i * 2]);
        let mut curve = WireCurve {
            count: bytes[0],
            ..Default::default()
        };
        for (i, point) in curve.points.iter_mut().enumerate() {
            *point = pair(i);
        }
        for (i, control) in curve.controls.iter_mut().enumerate() {
            *control = pair(MAX_CURVE_POINTS + i);
        }
        curve
    }
}

/// One mapping for a parameter of the sending module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MappingRecord {
    pub param_id: u8,
    pub action_type: u8,
    pub curve: WireCurve,
    /// Action target union, interpreted according to `action_type`
    pub target: [u8; 3],
}

impl MappingRecord {
    fn write(&self, out: &mut [u8]) {
        out[0] = self.param_id;
        out[1] = self.action_type;
        self.curve.write(&mut out[2..2 + CURVE_WIRE_SIZE]);
        out[2 + CURVE_WIRE_SIZE..MAPPING_RECORD_SIZE].copy_from_slice(&self.target);
    }

    fn read(bytes: &[u8]) -> Self {
        let t = 2 + CURVE_WIRE_SIZE;
        Self {
            param_id: bytes[0],
            action_type: bytes[1],
            curve: WireCurve::read(&bytes[2..t]),
            target: [bytes[t], bytes[t + 1], bytes[t + 2]],
        }
    }
}

/// Encode a mapping payload
pub fn encode_records(records: &[MappingRecord]) -> Result<Vec<u8, MAX_PAYLOAD_SIZE>, FrameError> {
    if records.len() > MAX_MAPPING_RECORDS {
        return Err(FrameError::PayloadTooLarge);
    }
    let mut out = Vec::new();
    out.resize(1 + records.len() * MAPPING_RECORD_SIZE, 0)
        .map_err(|_| FrameError::PayloadTooLarge)?;
    out[0] = records.len() as u8;
    for (record, chunk) in records
        .iter()
        .zip(out[1..].chunks_exact_mut(MAPPING_RECORD_SIZE))
    {
        record.write(chunk);
    }
    Ok(out)
}

/// Decode a mapping payload
///
/// The count is clamped to [`MAX_MAPPING_RECORDS`] and to the whole
/// records present.
pub fn decode_records(payload: &[u8]) -> Result<Vec<MappingRecord, MAX_MAPPING_RECORDS>, FrameError> {
    let (&count, body) = payload.split_first().ok_or(FrameError::Truncated)?;
    let count = (count as usize)
        .min(MAX_MAPPING_RECORDS)
        .min(body.len() / MAPPING_RECORD_SIZE);

    Ok(body
        .chunks_exact(MAPPING_RECORD_SIZE)
        .take(count)
        .map(MappingRecord::read)
        .collect())
}

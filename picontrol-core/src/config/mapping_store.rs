//! Binary record of the mapping table
//!
//! ```text
//! magic u32 "MAP1" | version u16 | count u16 | checksum u32
//! count x { row i8 | col i8 | param u8 | action u8 | d1 u8 | d2 u8 }
//! ```
//!
//! All fields little-endian. The checksum covers the records only. Curves
//! do not fit this layout and are kept in a postcard companion record.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::crc::checksum33;
use super::store::StoreError;
use crate::mapping::{Action, Curve, MappingKey, MappingTable, MAX_MAPPINGS};
use crate::port::SlotId;

/// "MAP1"
pub const MAPPINGS_MAGIC: u32 = 0x3150_414D;

pub const MAPPINGS_VERSION: u16 = 1;

pub const HEADER_SIZE: usize = 12;

pub const RECORD_SIZE: usize = 6;

/// Largest encoded table
pub const MAX_TABLE_SIZE: usize = HEADER_SIZE + MAX_MAPPINGS * RECORD_SIZE;

/// Upper bound of the postcard-encoded curve companion
pub const MAX_CURVES_SIZE: usize = 1024;

/// Curve of one mapping, as stored in the companion record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveEntry {
    pub key: MappingKey,
    pub curve: Curve,
}

/// Serialize the actions of every mapping
pub fn encode_table(table: &MappingTable) -> Vec<u8, MAX_TABLE_SIZE> {
    let mut records: Vec<u8, { MAX_MAPPINGS * RECORD_SIZE }> = Vec::new();
    for mapping in table.iter() {
        let (kind, d1, d2) = mapping.action.parts();
        let record = [
            mapping.key.slot.row(),
            mapping.key.slot.col(),
            mapping.key.param_id,
            kind,
            d1,
            d2,
        ];
        // The table never holds more than MAX_MAPPINGS entries
        let _ = records.extend_from_slice(&record);
    }

    let count = (records.len() / RECORD_SIZE) as u16;
    let mut out = Vec::new();
    let _ = out.extend_from_slice(&MAPPINGS_MAGIC.to_le_bytes());
    let _ = out.extend_from_slice(&MAPPINGS_VERSION.to_le_bytes());
    let _ = out.extend_from_slice(&count.to_le_bytes());
    let _ = out.extend_from_slice(&checksum33(&records).to_le_bytes());
    let _ = out.extend_from_slice(&records);
    out
}

/// Parse a stored table
///
/// The whole table is rejected on a bad header or checksum. Individual
/// records naming a cell outside the grid or an unknown action are
/// skipped.
pub fn decode_table(bytes: &[u8]) -> Result<Vec<(MappingKey, Action), MAX_MAPPINGS>, StoreError> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::InvalidFormat);
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let count = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
    let checksum = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    if magic != MAPPINGS_MAGIC || version != MAPPINGS_VERSION {
        return Err(StoreError::InvalidFormat);
    }
    if count > MAX_MAPPINGS {
        return Err(StoreError::TooLarge);
    }
    let records = bytes
        .get(HEADER_SIZE..HEADER_SIZE + count * RECORD_SIZE)
        .ok_or(StoreError::InvalidFormat)?;
    if checksum33(records) != checksum {
        warn!("mapping table checksum mismatch");
        return Err(StoreError::ChecksumMismatch);
    }

    let mut out = Vec::new();
    for record in records.chunks_exact(RECORD_SIZE) {
        let Some(slot) = SlotId::from_signed(record[0] as i8 as i32, record[1] as i8 as i32) else {
            warn!("stored mapping for cell {},{} skipped", record[0], record[1]);
            continue;
        };
        let Ok(action) = Action::from_parts(record[3], record[4], record[5]) else {
            warn!("stored mapping with action {} skipped", record[3]);
            continue;
        };
        let _ = out.push((MappingKey::new(slot, record[2]), action));
    }
    Ok(out)
}

/// Mappings whose curve differs from the default
pub fn curve_entries(table: &MappingTable) -> Vec<CurveEntry, MAX_MAPPINGS> {
    let linear = Curve::default();
    table
        .iter()
        .filter(|m| m.curve != linear)
        .map(|m| CurveEntry {
            key: m.key,
            curve: m.curve.clone(),
        })
        .collect()
}

//! Cache of host-written parameter values
//!
//! When the host writes a writable parameter the value is remembered per
//! cell and replayed to whatever module is next seen in that cell.

use heapless::Vec;
use picontrol_protocol::{DataType, ParameterValue};
use serde::{Deserialize, Serialize};

use super::crc::crc32_update;
use crate::port::SlotId;

/// Magic number to identify a valid parameter cache ("PRM1")
pub const PARAM_CACHE_MAGIC: u32 = 0x314D_5250;

/// Current parameter cache version
pub const PARAM_CACHE_VERSION: u8 = 1;

/// Values kept across all cells
pub const MAX_CACHED_PARAMS: usize = 64;

/// One remembered value in its wire form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CachedParam {
    pub slot: SlotId,
    pub param_id: u8,
    pub data_type: u8,
    pub bytes: [u8; 4],
}

impl CachedParam {
    pub fn value(&self) -> Option<ParameterValue> {
        let data_type = DataType::from_byte(self.data_type)?;
        ParameterValue::decode(data_type, &self.bytes).ok()
    }
}

/// Parameter cache stored in flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamCache {
    /// Magic number for validation
    pub magic: u32,
    /// Data format version
    pub version: u8,
    pub entries: Vec<CachedParam, MAX_CACHED_PARAMS>,
    /// CRC32 over magic..entries
    pub crc: u32,
}

impl Default for ParamCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamCache {
    pub const fn new() -> Self {
        Self {
            magic: PARAM_CACHE_MAGIC,
            version: PARAM_CACHE_VERSION,
            entries: Vec::new(),
            crc: 0,
        }
    }

    /// Magic and version match
    pub fn is_valid(&self) -> bool {
        self.magic == PARAM_CACHE_MAGIC && self.version == PARAM_CACHE_VERSION
    }

    /// Cached value of a parameter, if stored with the expected type
    pub fn get(&self, slot: SlotId, param_id: u8, data_type: DataType) -> Option<ParameterValue> {
        self.entries
            .iter()
            .find(|e| e.slot == slot && e.param_id == param_id)
            .filter(|e| e.data_type == data_type.to_byte())
            .and_then(CachedParam::value)
    }

    /// Remember a value
    ///
    /// Returns false if the cache is full and the parameter is new.
    pub fn set(&mut self, slot: SlotId, param_id: u8, value: &ParameterValue) -> bool {
        let entry = CachedParam {
            slot,
            param_id,
            data_type: value.data_type().to_byte(),
            bytes: value.to_bytes(),
        };
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.slot == slot && e.param_id == param_id)
        {
            *existing = entry;
            return true;
        }
        self.entries.push(entry).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn calculate_crc(&self) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        crc = crc32_update(crc, &self.magic.to_le_bytes());
        crc = crc32_update(crc, &[self.version]);
        for entry in &self.entries {
            crc = crc32_update(
                crc,
                &[entry.slot.row(), entry.slot.col(), entry.param_id, entry.data_type],
            );
            crc = crc32_update(crc, &entry.bytes);
        }
        !crc
    }

    pub fn update_crc(&mut self) {
        self.crc = self.calculate_crc();
    }

    pub fn verify_crc(&self) -> bool {
        self.crc == self.calculate_crc()
    }
}

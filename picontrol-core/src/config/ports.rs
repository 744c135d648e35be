//! Per-slot port configuration
//!
//! Holds the 180 degree rotation override of every grid cell. The flag
//! belongs to the cell, not the module, so it survives re-insertion.

use serde::{Deserialize, Serialize};

use super::crc::crc32_update;
use crate::port::{SlotId, SLOT_COUNT};

/// Magic number to identify valid port configuration ("CFG1")
pub const PORT_CONFIG_MAGIC: u32 = 0x3147_4643;

/// Current port configuration version
pub const PORT_CONFIG_VERSION: u8 = 1;

/// Port configuration stored in flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortConfigData {
    /// Magic number for validation
    pub magic: u32,
    /// Data format version
    pub version: u8,
    /// Rotation override per cell, row-major
    pub rotated_180: [bool; SLOT_COUNT],
    /// CRC32 over magic..rotated_180
    pub crc: u32,
}

impl Default for PortConfigData {
    fn default() -> Self {
        Self::new()
    }
}

impl PortConfigData {
    pub const fn new() -> Self {
        Self {
            magic: PORT_CONFIG_MAGIC,
            version: PORT_CONFIG_VERSION,
            rotated_180: [false; SLOT_COUNT],
            crc: 0,
        }
    }

    /// Magic and version match
    pub fn is_valid(&self) -> bool {
        self.magic == PORT_CONFIG_MAGIC && self.version == PORT_CONFIG_VERSION
    }

    pub fn rotated(&self, slot: SlotId) -> bool {
        self.rotated_180[slot.index()]
    }

    /// Returns whether the stored flag changed
    pub fn set_rotated(&mut self, slot: SlotId, rotated: bool) -> bool {
        let flag = &mut self.rotated_180[slot.index()];
        let changed = *flag != rotated;
        *flag = rotated;
        changed
    }

    pub fn calculate_crc(&self) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        crc = crc32_update(crc, &self.magic.to_le_bytes());
        crc = crc32_update(crc, &[self.version]);
        for &rotated in &self.rotated_180 {
            crc = crc32_update(crc, &[rotated as u8]);
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

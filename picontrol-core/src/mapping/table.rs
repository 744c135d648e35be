//! The host-side mapping table
//!
//! At most [`MAX_MAPPINGS`] entries, one per `(slot, parameter)` key. The
//! scan loop and the console share the table through [`SharedMappings`],
//! a blocking mutex whose closure-scoped lock is released on every exit
//! path.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;
use picontrol_protocol::{MappingRecord, MAX_MAPPING_RECORDS};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::curve::Curve;
use super::MappingError;
use crate::port::SlotId;

/// Maximum number of mappings held by the hub
pub const MAX_MAPPINGS: usize = 32;

/// Identity of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MappingKey {
    pub slot: SlotId,
    pub param_id: u8,
}

impl MappingKey {
    pub const fn new(slot: SlotId, param_id: u8) -> Self {
        Self { slot, param_id }
    }
}

/// One mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mapping {
    pub key: MappingKey,
    pub action: Action,
    pub curve: Curve,
}

impl Mapping {
    /// Wire form for module-resident mapping storage
    pub fn to_record(&self) -> MappingRecord {
        MappingRecord {
            param_id: self.key.param_id,
            action_type: self.action.action_type().as_u8(),
            curve: self.curve.to_wire(),
            target: self.action.to_wire(),
        }
    }

    /// Build from a module record; an invalid curve falls back to linear
    pub fn from_record(slot: SlotId, record: &MappingRecord) -> Result<Self, MappingError> {
        Ok(Self {
            key: MappingKey::new(slot, record.param_id),
            action: Action::from_wire(record.action_type, record.target)?,
            curve: Curve::from_wire(&record.curve).unwrap_or_default(),
        })
    }
}

/// Bounded mapping table with linear lookup
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<Mapping, MAX_MAPPINGS>,
}

impl MappingTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.entries.iter()
    }

    pub fn get(&self, key: &MappingKey) -> Option<&Mapping> {
        self.entries.iter().find(|m| m.key == *key)
    }

    fn get_mut(&mut self, key: &MappingKey) -> Option<&mut Mapping> {
        self.entries.iter_mut().find(|m| m.key == *key)
    }

    /// Insert or update the action of a mapping
    ///
    /// An existing mapping keeps its curve; a new one starts linear.
    pub fn set(&mut self, key: MappingKey, action: Action) -> Result<(), MappingError> {
        if let Some(existing) = self.get_mut(&key) {
            existing.action = action;
            return Ok(());
        }
        self.entries
            .push(Mapping {
                key,
                action,
                curve: Curve::default(),
            })
            .map_err(|_| MappingError::TableFull)
    }

    /// Insert or replace a whole mapping
    pub fn upsert(&mut self, mapping: Mapping) -> Result<(), MappingError> {
        if let Some(existing) = self.get_mut(&mapping.key) {
            *existing = mapping;
            return Ok(());
        }
        self.entries
            .push(mapping)
            .map_err(|_| MappingError::TableFull)
    }

    /// Replace the curve of an existing mapping
    pub fn set_curve(&mut self, key: &MappingKey, curve: Curve) -> Result<(), MappingError> {
        let mapping = self.get_mut(key).ok_or(MappingError::NotFound)?;
        mapping.curve = curve;
        Ok(())
    }

    /// Remove a mapping; returns whether it existed
    pub fn remove(&mut self, key: &MappingKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| m.key != *key);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every mapping owned by `slot`; returns how many were removed
    pub fn clear_slot(&mut self, slot: SlotId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.key.slot != slot);
        before - self.entries.len()
    }

    /// Wire records of the first mappings owned by `slot`
    pub fn slot_records(&self, slot: SlotId) -> Vec<MappingRecord, MAX_MAPPING_RECORDS> {
        self.entries
            .iter()
            .filter(|m| m.key.slot == slot)
            .take(MAX_MAPPING_RECORDS)
            .map(Mapping::to_record)
            .collect()
    }

    /// Replace the mappings of `slot` with records reported by its module
    ///
    /// Records with unknown action types are skipped. Returns the number
    /// of mappings stored.
    pub fn replace_slot(&mut self, slot: SlotId, records: &[MappingRecord]) -> usize {
        self.clear_slot(slot);
        let mut stored = 0;
        for record in records {
            let Ok(mapping) = Mapping::from_record(slot, record) else {
                continue;
            };
            if self.upsert(mapping).is_err() {
                break;
            }
            stored += 1;
        }
        stored
    }
}

/// Mapping table shared between the scan loop and the console
pub type SharedMappings<M> = Mutex<M, RefCell<MappingTable>>;

/// Run `f` with the table locked
pub fn with_mappings<M: RawMutex, R>(
    shared: &SharedMappings<M>,
    f: impl FnOnce(&mut MappingTable) -> R,
) -> R {
    shared.lock(|table| f(&mut table.borrow_mut()))
}

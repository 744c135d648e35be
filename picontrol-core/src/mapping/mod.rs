//! Parameter to MIDI / keyboard mapping
//!
//! A parameter change is flipped for upside-down rotation-aware modules,
//! normalized to 0-255, shaped by the mapping's response curve and finally
//! turned into an output action on the relevant edge or change.

pub mod action;
pub mod curve;
pub mod engine;
pub mod table;
pub mod transform;

pub use action::{Action, ActionType, OutputAction};
pub use curve::{Curve, CurvePoint};
pub use engine::{MappingEngine, ValueContext};
pub use table::{with_mappings, Mapping, MappingKey, MappingTable, SharedMappings, MAX_MAPPINGS};

/// Mapping table and configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MappingError {
    /// No free entry for a new mapping
    TableFull,
    /// No mapping with that key
    NotFound,
    /// Curve shape is not 2-4 sorted points with one control per segment
    InvalidCurve,
    /// Action type code outside the known set
    UnknownActionType,
}

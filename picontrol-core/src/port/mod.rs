//! Slot lifecycle: detection, descriptor handshake and removal
//!
//! Each grid cell owns a small explicit state machine. Detection is driven
//! by sampled line levels, the handshake by `GetProperties` responses, and
//! removal by the liveness timestamps kept in [`crate::link`].

pub mod events;
pub mod grid;
pub mod machine;
pub mod manager;

pub use events::SlotEvent;
pub use grid::{Orientation, SlotId, GRID_COLS, GRID_ROWS, SLOT_COUNT};
pub use machine::SlotState;
pub use manager::{PortManager, PortState};

//! Board-agnostic core logic for the PiControl hub
//!
//! This crate contains all hub logic that does not depend on a specific
//! board:
//!
//! - Slot grid, detection and module lifecycle
//! - Per-slot frame reception, liveness and the shared frame queue
//! - Parameter polling, push delivery and notification throttling
//! - Mapping table, response curves and output actions
//! - Host console and request queues
//! - Persistent configuration records
//! - Board and host abstraction traits

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod fmt;

pub mod config;
pub mod host;
pub mod hub;
pub mod link;
pub mod mapping;
pub mod port;
pub mod scheduler;
pub mod shared;
pub mod sync;
pub mod traits;

#[cfg(test)]
mod testing;

pub use hub::Hub;
pub use shared::HubShared;

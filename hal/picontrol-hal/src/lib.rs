//! PiControl Hardware Abstraction Layer
//!
//! This crate defines the hardware traits the hub core is written against.
//! Chip-specific crates implement them for the actual slot transports,
//! sense lines and flash.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  picontrol-core (scan loop, sync, maps) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  picontrol-hal (this crate - traits)    │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  PIO UART per │       │  flash k/v    │
//! │     slot      │       │   storage     │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::ByteChannel`] - Per-slot byte transport
//! - [`gpio::InputPin`], [`gpio::LineLevels`] - Slot line sensing
//! - [`flash::FlashStorage`] - Persistent storage

#![no_std]
#![deny(unsafe_code)]

pub mod flash;
pub mod gpio;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use flash::{FlashError, FlashStorage, StorageKey};
pub use gpio::{ActiveLine, InputPin, Level, LineLevels};
pub use uart::ByteChannel;

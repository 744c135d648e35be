//! Module Link Protocol
//!
//! This crate defines the framed serial protocol between the PiControl hub
//! and the modules plugged into its slots. Each slot has its own
//! point-to-point link; the hub issues requests and modules answer with a
//! single `Response` command.
//!
//! # Protocol Overview
//!
//! All messages use a simple binary frame format:
//! ```text
//! ┌───────┬─────────┬────────────┬─────────────┬──────────┐
//! │ START │ COMMAND │ LENGTH(LE) │ PAYLOAD     │ CHECKSUM │
//! │ 1B    │ 1B      │ 2B         │ 0–2048B     │ 1B       │
//! └───────┴─────────┴────────────┴─────────────┴──────────┘
//! ```
//!
//! The checksum is the low byte of the sum of every preceding byte. The
//! decoder recovers from any corruption by resynchronizing on the next
//! START byte, and abandons partial frames after a 50 ms silence.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod fmt;

pub mod command;
pub mod descriptor;
pub mod frame;
pub mod mapping;
pub mod value;

pub use command::{CommandId, Request, Response, Status};
pub use descriptor::{
    Access, Capabilities, ModuleDescriptor, Parameter, ValueRange, MAX_PARAMETERS,
};
pub use frame::{encode, Frame, FrameError, FrameParser, FRAME_START, MAX_PAYLOAD_SIZE};
pub use mapping::{MappingRecord, WireCurve, MAX_MAPPING_RECORDS};
pub use value::{DataType, LedValue, ParameterValue};

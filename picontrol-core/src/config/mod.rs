//! Hub configuration and persisted records
//!
//! This module contains:
//! - `settings`: timing and policy knobs of the scan loop
//! - `ports`, `params`: postcard records with magic, version and CRC32
//! - `mapping_store`: the fixed binary layout of the mapping table
//! - `store`: async load/save through the flash abstraction

pub mod crc;
pub mod mapping_store;
pub mod params;
pub mod ports;
pub mod settings;
pub mod store;

pub use params::{CachedParam, ParamCache, MAX_CACHED_PARAMS};
pub use ports::PortConfigData;
pub use settings::HubSettings;
pub use store::StoreError;

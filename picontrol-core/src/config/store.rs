//! Loading and saving configuration through [`FlashStorage`]
//!
//! The mapping table and its curves are each written to a temporary key,
//! and only once both writes succeed are they renamed into place, so a
//! failed save leaves the previous table and curves readable. Port configuration and the parameter cache are single-key
//! records and are written directly.

use picontrol_hal::{FlashError, FlashStorage, StorageKey};

use super::mapping_store::{
    curve_entries, decode_table, encode_table, CurveEntry, MAX_CURVES_SIZE, MAX_TABLE_SIZE,
};
use super::params::ParamCache;
use super::ports::PortConfigData;
use crate::mapping::{MappingTable, MAX_MAPPINGS};

/// Maximum serialized port configuration size
const MAX_PORT_CONFIG_SIZE: usize = 64;

/// Maximum serialized parameter cache size
const MAX_PARAM_CACHE_SIZE: usize = 1024;

/// Persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Flash operation failed
    Flash(FlashError),
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Invalid magic or version
    InvalidFormat,
    /// CRC or checksum check failed
    ChecksumMismatch,
    /// More entries than the in-memory structure holds
    TooLarge,
}

impl From<FlashError> for StoreError {
    fn from(e: FlashError) -> Self {
        StoreError::Flash(e)
    }
}

/// Save the mapping table and its curves
pub async fn save_mappings<F: FlashStorage>(
    storage: &mut F,
    table: &MappingTable,
) -> Result<(), StoreError> {
    let table_bytes = encode_table(table);
    let curves = curve_entries(table);
    let mut buffer = [0u8; MAX_CURVES_SIZE];
    let curve_bytes =
        postcard::to_slice(&curves, &mut buffer).map_err(|_| StoreError::Serialize)?;
    debug!(
        "Saving {} bytes of mappings and {} bytes of curves to flash",
        table_bytes.len(),
        curve_bytes.len()
    );

    // Both temporaries must be complete before either replaces its record
    storage.write(StorageKey::MappingsTemp, &table_bytes).await?;
    storage.write(StorageKey::MappingCurvesTemp, curve_bytes).await?;
    storage
        .rename(StorageKey::MappingsTemp, StorageKey::Mappings)
        .await?;
    storage
        .rename(StorageKey::MappingCurvesTemp, StorageKey::MappingCurves)
        .await?;

    info!("Saved {} mappings to flash", table.len());
    Ok(())
}

/// Load the mapping table
///
/// No stored table yields an empty one. Any other failure is returned and
/// the caller keeps its current table.
pub async fn load_mappings<F: FlashStorage>(storage: &mut F) -> Result<MappingTable, StoreError> {
    let mut buffer = [0u8; MAX_TABLE_SIZE];
    let len = match storage.read(StorageKey::Mappings, &mut buffer).await {
        Ok(len) => len,
        Err(FlashError::NotFound) => {
            debug!("No mappings in flash, starting empty");
            return Ok(MappingTable::new());
        }
        Err(e) => {
            warn!("Failed to read mappings: {:?}", e);
            return Err(e.into());
        }
    };

    let mut table = MappingTable::new();
    for (key, action) in decode_table(&buffer[..len])? {
        table.set(key, action).map_err(|_| StoreError::TooLarge)?;
    }

    match load_curves(storage).await {
        Ok(curves) => {
            for entry in curves {
                // Shape is re-checked since deserialization bypasses it
                if let Some(curve) = entry.curve.validated() {
                    let _ = table.set_curve(&entry.key, curve);
                }
            }
        }
        Err(StoreError::Flash(FlashError::NotFound)) => {}
        Err(e) => warn!("Ignoring stored curves: {:?}", e),
    }

    info!("Loaded {} mappings from flash", table.len());
    Ok(table)
}

async fn load_curves<F: FlashStorage>(
    storage: &mut F,
) -> Result<heapless::Vec<CurveEntry, MAX_MAPPINGS>, StoreError> {
    let mut buffer = [0u8; MAX_CURVES_SIZE];
    let len = storage
        .read(StorageKey::MappingCurves, &mut buffer)
        .await?;
    postcard::from_bytes(&buffer[..len]).map_err(|_| StoreError::Deserialize)
}

/// Load port configuration, falling back to defaults
pub async fn load_port_config<F: FlashStorage>(storage: &mut F) -> PortConfigData {
    match load_port_config_inner(storage).await {
        Ok(data) => {
            info!("Loaded port configuration from flash");
            data
        }
        Err(StoreError::Flash(FlashError::NotFound)) => {
            debug!("No port configuration in flash, using defaults");
            PortConfigData::new()
        }
        Err(e) => {
            warn!("Failed to load port configuration: {:?}, using defaults", e);
            PortConfigData::new()
        }
    }
}

async fn load_port_config_inner<F: FlashStorage>(
    storage: &mut F,
) -> Result<PortConfigData, StoreError> {
    let mut buffer = [0u8; MAX_PORT_CONFIG_SIZE];
    let len = storage.read(StorageKey::PortConfig, &mut buffer).await?;

    let data: PortConfigData =
        postcard::from_bytes(&buffer[..len]).map_err(|_| StoreError::Deserialize)?;
    if !data.is_valid() {
        return Err(StoreError::InvalidFormat);
    }
    if !data.verify_crc() {
        warn!("Port configuration CRC mismatch");
        return Err(StoreError::ChecksumMismatch);
    }
    Ok(data)
}

/// Save port configuration, updating its CRC first
pub async fn save_port_config<F: FlashStorage>(
    storage: &mut F,
    data: &mut PortConfigData,
) -> Result<(), StoreError> {
    data.update_crc();

    let mut buffer = [0u8; MAX_PORT_CONFIG_SIZE];
    let bytes = postcard::to_slice(data, &mut buffer).map_err(|_| StoreError::Serialize)?;
    storage.write(StorageKey::PortConfig, bytes).await?;

    info!("Saved port configuration to flash");
    Ok(())
}

/// Load the parameter cache, falling back to an empty one
pub async fn load_param_cache<F: FlashStorage>(storage: &mut F) -> ParamCache {
    match load_param_cache_inner(storage).await {
        Ok(cache) => {
            info!("Loaded {} cached parameters from flash", cache.len());
            cache
        }
        Err(StoreError::Flash(FlashError::NotFound)) => {
            debug!("No parameter cache in flash");
            ParamCache::new()
        }
        Err(e) => {
            warn!("Failed to load parameter cache: {:?}", e);
            ParamCache::new()
        }
    }
}

async fn load_param_cache_inner<F: FlashStorage>(storage: &mut F) -> Result<ParamCache, StoreError> {
    let mut buffer = [0u8; MAX_PARAM_CACHE_SIZE];
    let len = storage.read(StorageKey::ParamCache, &mut buffer).await?;

    let cache: ParamCache =
        postcard::from_bytes(&buffer[..len]).map_err(|_| StoreError::Deserialize)?;
    if !cache.is_valid() {
        return Err(StoreError::InvalidFormat);
    }
    if !cache.verify_crc() {
        warn!("Parameter cache CRC mismatch");
        return Err(StoreError::ChecksumMismatch);
    }
    Ok(cache)
}

/// Save the parameter cache, updating its CRC first
pub async fn save_param_cache<F: FlashStorage>(
    storage: &mut F,
    cache: &mut ParamCache,
) -> Result<(), StoreError> {
    cache.update_crc();

    let mut buffer = [0u8; MAX_PARAM_CACHE_SIZE];
    let bytes = postcard::to_slice(cache, &mut buffer).map_err(|_| StoreError::Serialize)?;
    storage.write(StorageKey::ParamCache, bytes).await?;

    debug!("Saved {} cached parameters", cache.len());
    Ok(())
}

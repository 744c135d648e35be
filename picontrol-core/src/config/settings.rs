//! Hub timing and behavior settings
//!
//! Stored as postcard binary data alongside the rest of the configuration;
//! the defaults are the reference timings of the module link.

use serde::{Deserialize, Serialize};

/// Timing and policy knobs for the scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HubSettings {
    /// Inter-byte gap after which a partial frame is dropped
    pub parser_timeout_ms: u32,
    /// Spacing between detection samples of an empty slot
    pub detect_debounce_ms: u32,
    /// Spacing between GetProperties attempts
    pub properties_retry_ms: u32,
    /// GetProperties attempts before the hub stops asking
    pub properties_max_attempts: u8,
    /// Silence after which a slot is considered empty
    pub response_timeout_ms: u32,
    /// Keep-alive ping interval for ready modules
    pub ping_interval_ms: u32,
    /// One parameter is polled per interval in poll mode
    pub poll_interval_ms: u32,
    /// Delay between a write and its confirmation poll
    pub confirm_delay_ms: u32,
    /// Minimum spacing of host notifications per parameter
    pub notify_throttle_ms: u32,
    /// Interval requested from push-mode modules (0 = on change only)
    pub autoupdate_interval_ms: u16,
    /// Mappings live on the modules and are fetched at handshake
    pub module_resident_mappings: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            parser_timeout_ms: 50,
            detect_debounce_ms: 10,
            properties_retry_ms: 50,
            properties_max_attempts: 10,
            response_timeout_ms: 500,
            ping_interval_ms: 500,
            poll_interval_ms: 50,
            confirm_delay_ms: 20,
            notify_throttle_ms: 100,
            autoupdate_interval_ms: 0,
            module_resident_mappings: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_postcard_roundtrip() {
        let settings = HubSettings {
            module_resident_mappings: true,
            autoupdate_interval_ms: 25,
            ..Default::default()
        };
        let mut buffer = [0u8; 64];
        let bytes = postcard::to_slice(&settings, &mut buffer).unwrap();
        let decoded: HubSettings = postcard::from_bytes(bytes).unwrap();
        assert_eq!(decoded, settings);
    }
}

//! Host-side doubles shared by unit tests

use std::collections::HashMap;
use std::vec::Vec;

use picontrol_hal::{FlashError, FlashStorage, StorageKey};

/// In-memory key-value flash
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<u8, Vec<u8>>,
    pub fail_writes: bool,
    /// Fail writes to this key only
    pub fail_write_key: Option<StorageKey>,
    pub fail_renames: bool,
}

impl MemoryStorage {
    pub fn insert(&mut self, key: StorageKey, data: &[u8]) {
        self.entries.insert(key.as_u8(), data.to_vec());
    }

    pub fn get(&self, key: StorageKey) -> Option<&[u8]> {
        self.entries.get(&key.as_u8()).map(Vec::as_slice)
    }
}

impl FlashStorage for MemoryStorage {
    async fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        let data = self.get(key).ok_or(FlashError::NotFound)?;
        let target = buffer
            .get_mut(..data.len())
            .ok_or(FlashError::BufferTooSmall)?;
        target.copy_from_slice(data);
        Ok(data.len())
    }

    async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        if self.fail_writes || self.fail_write_key == Some(key) {
            return Err(FlashError::Flash);
        }
        self.insert(key, data);
        Ok(())
    }

    async fn exists(&mut self, key: StorageKey) -> bool {
        self.entries.contains_key(&key.as_u8())
    }

    async fn remove(&mut self, key: StorageKey) -> Result<(), FlashError> {
        self.entries.remove(&key.as_u8());
        Ok(())
    }

    async fn rename(&mut self, from: StorageKey, to: StorageKey) -> Result<(), FlashError> {
        if self.fail_renames {
            return Err(FlashError::Storage);
        }
        let data = self
            .entries
            .remove(&from.as_u8())
            .ok_or(FlashError::NotFound)?;
        self.entries.insert(to.as_u8(), data);
        Ok(())
    }
}

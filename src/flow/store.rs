//! Durable "capture completed" flags
//!
//! One boolean per meter type, last writer wins. The flag is what lets a
//! reloaded app land back on the results screen instead of the camera.

use super::types::MeterType;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Durable store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(String),
}

/// Key-value slot for the durable capture flag
pub trait FlagStore: Send + Sync {
    fn read(&self, meter_type: MeterType) -> Result<bool, StoreError>;

    fn write(&self, meter_type: MeterType, completed: bool) -> Result<(), StoreError>;
}

/// In-process flag store; does not survive a restart
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: RwLock<BTreeMap<MeterType, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn read(&self, meter_type: MeterType) -> Result<bool, StoreError> {
        Ok(self.flags.read().get(&meter_type).copied().unwrap_or(false))
    }

    fn write(&self, meter_type: MeterType, completed: bool) -> Result<(), StoreError> {
        self.flags.write().insert(meter_type, completed);
        Ok(())
    }
}

/// Flag store backed by a small JSON file (`{"water": true, ...}`)
pub struct JsonFlagStore {
    path: PathBuf,
    flags: RwLock<BTreeMap<String, bool>>,
}

impl JsonFlagStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let flags = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt flag store {:?}: {}", path, e);
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            flags: RwLock::new(flags),
        })
    }

    fn persist(&self, flags: &BTreeMap<String, bool>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(flags)?)?;
        Ok(())
    }
}

impl FlagStore for JsonFlagStore {
    fn read(&self, meter_type: MeterType) -> Result<bool, StoreError> {
        Ok(self
            .flags
            .read()
            .get(meter_type.key())
            .copied()
            .unwrap_or(false))
    }

    fn write(&self, meter_type: MeterType, completed: bool) -> Result<(), StoreError> {
        let mut guard = self.flags.write();
        guard.insert(meter_type.key().to_string(), completed);
        self.persist(&guard)?;
        tracing::debug!("Persisted {} capture flag = {}", meter_type, completed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_json_flags_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("flags.json");

        let store = JsonFlagStore::open(&path).unwrap();
        assert!(!store.read(MeterType::Water).unwrap());
        store.write(MeterType::Water, true).unwrap();
        store.write(MeterType::Electricity, false).unwrap();

        let reopened = JsonFlagStore::open(&path).unwrap();
        assert!(reopened.read(MeterType::Water).unwrap());
        assert!(!reopened.read(MeterType::Electricity).unwrap());
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flags.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFlagStore::open(&path).unwrap();
        assert!(!store.read(MeterType::Electricity).unwrap());
    }

    #[test]
    fn test_memory_store_last_writer_wins() {
        let store = MemoryFlagStore::new();
        store.write(MeterType::Water, true).unwrap();
        store.write(MeterType::Water, false).unwrap();
        assert!(!store.read(MeterType::Water).unwrap());
    }
}

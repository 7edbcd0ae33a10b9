//! Key/value persistence carried in a cluster's execution context.
//!
//! Clusters keep small bits of state (data versions, mostly) under string
//! keys. [`JsonFileStore`] writes the whole map back to disk on every change
//! so a restart picks up where the previous run left off.

use crate::error::Result;
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// On-disk layout of a [`JsonFileStore`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub entries: BTreeMap<String, String>,
}

impl PersistedState {
    /// Load from file; a missing or unreadable file yields an empty state.
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => {
                    info!(
                        "Loaded {} persisted entries from {:?}",
                        state.entries.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("Failed to parse state file: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No persisted state found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("Failed to read state file: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Store wrapper with auto-save
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<PersistedState>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        let state = PersistedState::load(&path);
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.state.read().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut state = self.state.write();
        if state.entries.get(key) == Some(&value) {
            return Ok(());
        }
        state.entries.insert(key.to_string(), value);
        state.save(&self.path)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.entries.remove(key).is_none() {
            return Ok(());
        }
        state.save(&self.path)
    }
}

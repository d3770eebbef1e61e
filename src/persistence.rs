//! Persistence layer for published sensor states
//!
//! Keeps the last state every sensor published in a JSON file so it can be
//! restored before the first live computation after a restart.

use crate::error::Result;
use crate::host::{SensorState, StateStore};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persistent state structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Last published state keyed by sensor unique id
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorState>,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: PathBuf,
    state: RwLock<PersistentState>,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            state: RwLock::new(PersistentState::default()),
            logger: get_logger("persistence"),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load state from disk; a missing file leaves the cache empty
    pub fn load(&self) -> Result<()> {
        if !self.file_path.exists() {
            self.logger.info("No persistent state file found, starting empty");
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.file_path)?;
        let loaded: PersistentState = serde_json::from_str(&contents)?;
        let count = loaded.sensors.len();
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = loaded;
        self.logger.info(&format!("Loaded persistent state for {} sensor(s)", count));

        Ok(())
    }

    /// Write `state` to disk
    fn save(&self, state: &PersistentState) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    /// Get the stored state of a sensor
    pub fn get(&self, unique_id: &str) -> Option<SensorState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sensors
            .get(unique_id)
            .cloned()
    }

    /// Store the state of a sensor and save it to disk.
    ///
    /// The write guard is held until the file is written, so concurrent
    /// callers reach the disk in the order they updated the cache.
    pub fn set(&self, unique_id: &str, state: SensorState) -> Result<()> {
        let mut persisted = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        persisted.sensors.insert(unique_id.to_string(), state);
        self.save(&persisted)
    }
}

impl StateStore for PersistenceManager {
    fn restore_last(&self, unique_id: &str) -> Option<SensorState> {
        self.get(unique_id)
    }

    fn persist_last(&self, unique_id: &str, state: &SensorState) -> Result<()> {
        self.set(unique_id, state.clone())
    }
}

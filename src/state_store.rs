//! JSON-file persistence for sync registries.
//!
//! One pretty-printed JSON file per owner under the state directory, named
//! by the owner's safe key (`ana@example.com` → `ana_at_example_com.json`).
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use ragsync_core::namespace::safe_key;
use ragsync_core::sync_state::{StatePersistence, SyncState};

const MAX_FILE_STEM: usize = 120;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for `user_key`.
    pub fn path_for(&self, user_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", safe_key(user_key, MAX_FILE_STEM)))
    }
}

impl StatePersistence for JsonFileStore {
    fn load(&self, user_key: &str) -> Result<Option<SyncState>> {
        let path = self.path_for(user_key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let state: SyncState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if state.user_key != user_key {
            bail!(
                "{} belongs to '{}', not '{}'",
                path.display(),
                state.user_key,
                user_key
            );
        }
        Ok(Some(state))
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(&state.user_key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

//! Per-owner sync registry.
//!
//! The registry remembers which file versions were indexed for an owner, so
//! an incremental pass only reprocesses what changed. It is a cache of what
//! the orchestrator believes it indexed; the vector index stays the source
//! of truth for what is searchable.
//!
//! [`SyncRegistry::diff`] is a pure comparison. Every mutating call
//! (`record_file`, `remove_file`, `complete_sync`, `reset`) writes the whole
//! state through [`StatePersistence`] before returning.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::models::RawDocument;

/// What the registry knows about one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSyncRecord {
    pub file_id: String,
    pub name: String,
    /// Opaque version marker compared by string equality.
    pub last_modified_time: String,
    pub chunk_count: usize,
    pub last_synced_at: DateTime<Utc>,
}

/// Running counters across all completed passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncTotals {
    #[serde(default)]
    pub total_syncs: u64,
    #[serde(default)]
    pub total_files_processed: u64,
    #[serde(default)]
    pub total_chunks_created: u64,
}

/// Persisted registry for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub user_key: String,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, FileSyncRecord>,
    #[serde(default)]
    pub totals: SyncTotals,
}

impl SyncState {
    pub fn empty(user_key: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            last_sync_at: None,
            files: BTreeMap::new(),
            totals: SyncTotals::default(),
        }
    }
}

/// Anything with a stable id and a version marker can be diffed.
pub trait Versioned {
    fn version_id(&self) -> &str;
    fn version_marker(&self) -> &str;
}

impl Versioned for RawDocument {
    fn version_id(&self) -> &str {
        &self.id
    }

    fn version_marker(&self) -> &str {
        &self.modified_time
    }
}

/// Classification of a listing against the registry.
///
/// Every listed item lands in exactly one of `new`, `modified`, `unchanged`.
/// `deleted_ids` holds registry ids absent from the listing, sorted.
#[derive(Debug)]
pub struct SyncDiff<'a, T> {
    pub new: Vec<&'a T>,
    pub modified: Vec<&'a T>,
    pub unchanged: Vec<&'a T>,
    pub deleted_ids: Vec<String>,
}

impl<'a, T> SyncDiff<'a, T> {
    /// Items that need (re)indexing: new first, then modified, each in
    /// listing order.
    pub fn to_process(&self) -> Vec<&'a T> {
        self.new.iter().chain(self.modified.iter()).copied().collect()
    }

    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted_ids.is_empty()
    }
}

/// Compare a listing with a registry snapshot.
pub fn diff_files<'a, T: Versioned>(state: &SyncState, current: &'a [T]) -> SyncDiff<'a, T> {
    let mut new = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for item in current {
        match state.files.get(item.version_id()) {
            None => new.push(item),
            Some(record) if record.last_modified_time != item.version_marker() => {
                modified.push(item)
            }
            Some(_) => unchanged.push(item),
        }
    }

    let listed: std::collections::HashSet<&str> =
        current.iter().map(|item| item.version_id()).collect();
    // BTreeMap keys iterate sorted.
    let deleted_ids = state
        .files
        .keys()
        .filter(|id| !listed.contains(id.as_str()))
        .cloned()
        .collect();

    SyncDiff {
        new,
        modified,
        unchanged,
        deleted_ids,
    }
}

/// Durable storage for registry snapshots, keyed by owner.
pub trait StatePersistence: Send + Sync {
    fn load(&self, user_key: &str) -> Result<Option<SyncState>>;
    fn save(&self, state: &SyncState) -> Result<()>;
}

/// Process-local persistence. Clones share the same backing map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    states: Arc<RwLock<HashMap<String, SyncState>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for InMemoryPersistence {
    fn load(&self, user_key: &str) -> Result<Option<SyncState>> {
        let states = self
            .states
            .read()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        Ok(states.get(user_key).cloned())
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        let mut states = self
            .states
            .write()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        states.insert(state.user_key.clone(), state.clone());
        Ok(())
    }
}

/// Summary for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    pub user_key: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub files_tracked: usize,
    pub total_syncs: u64,
    pub total_files_processed: u64,
    pub total_chunks_created: u64,
}

/// An owner's registry bound to its persistence.
pub struct SyncRegistry {
    state: SyncState,
    persistence: Box<dyn StatePersistence>,
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SyncRegistry {
    /// Load the owner's registry, or start empty.
    ///
    /// A snapshot that cannot be read (corrupt file, I/O error) is logged
    /// and treated as empty, so the next pass reindexes everything.
    pub fn open(user_key: impl Into<String>, persistence: Box<dyn StatePersistence>) -> Self {
        let user_key = user_key.into();
        let state = match persistence.load(&user_key) {
            Ok(Some(state)) => state,
            Ok(None) => SyncState::empty(&user_key),
            Err(e) => {
                warn!(user = %user_key, "unreadable sync state, starting empty: {:#}", e);
                SyncState::empty(&user_key)
            }
        };
        Self { state, persistence }
    }

    pub fn user_key(&self) -> &str {
        &self.state.user_key
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.state.files.contains_key(file_id)
    }

    pub fn get(&self, file_id: &str) -> Option<&FileSyncRecord> {
        self.state.files.get(file_id)
    }

    pub fn diff<'a, T: Versioned>(&self, current: &'a [T]) -> SyncDiff<'a, T> {
        diff_files(&self.state, current)
    }

    /// Record a successfully indexed file version and persist.
    pub fn record_file(
        &mut self,
        file_id: &str,
        name: &str,
        modified_time: &str,
        chunk_count: usize,
    ) -> Result<()> {
        self.state.files.insert(
            file_id.to_string(),
            FileSyncRecord {
                file_id: file_id.to_string(),
                name: name.to_string(),
                last_modified_time: modified_time.to_string(),
                chunk_count,
                last_synced_at: Utc::now(),
            },
        );
        self.persist()
    }

    /// Forget a file and persist. Unknown ids are a no-op but still persist.
    pub fn remove_file(&mut self, file_id: &str) -> Result<()> {
        self.state.files.remove(file_id);
        self.persist()
    }

    /// Stamp the pass completion time, bump totals, and persist.
    pub fn complete_sync(&mut self, files_processed: usize, chunks_created: usize) -> Result<()> {
        self.state.last_sync_at = Some(Utc::now());
        self.state.totals.total_syncs += 1;
        self.state.totals.total_files_processed += files_processed as u64;
        self.state.totals.total_chunks_created += chunks_created as u64;
        self.persist()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            user_key: self.state.user_key.clone(),
            last_sync_at: self.state.last_sync_at,
            files_tracked: self.state.files.len(),
            total_syncs: self.state.totals.total_syncs,
            total_files_processed: self.state.totals.total_files_processed,
            total_chunks_created: self.state.totals.total_chunks_created,
        }
    }

    /// Drop every record and counter, forcing a full reindex next pass.
    pub fn reset(&mut self) -> Result<()> {
        self.state = SyncState::empty(self.state.user_key.clone());
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        self.persistence.save(&self.state)
    }
}

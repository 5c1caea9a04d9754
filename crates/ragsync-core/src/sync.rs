//! Incremental sync orchestration.
//!
//! One [`SyncOrchestrator::run`] call is one pass for one owner:
//!
//! ```text
//! Start ──▶ Diffing ──▶ Deleting ──▶ PerFileProcessing ──▶ Finalizing ──▶ Done
//!   │
//!   └──▶ Failed   (index unavailable, or source listing failed)
//! ```
//!
//! The source is always listed in full; incrementality is computed locally
//! against the owner's [`SyncRegistry`]. Full mode skips diffing and
//! deletions and reprocesses every listed file. An incremental pass whose
//! listing comes back empty keeps everything already indexed.
//!
//! Failures of a single file or a single deletion are logged, recorded in
//! the [`SyncReport`], and the pass moves on. Only the two fatal cases in
//! [`SyncError`] abort, and both happen before anything is mutated.
//!
//! Collaborator calls are awaited one at a time, in listing order and then
//! chunk order. Two passes for the same owner must not run concurrently;
//! serializing them is up to the caller.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::context::{AccessContext, Credential};
use crate::embedding::Embedder;
use crate::error::{FileStage, SyncError};
use crate::index::VectorIndex;
use crate::models::{ChunkMetadata, RawDocument};
use crate::sync_state::SyncRegistry;

/// Lists every document the credential can see, with content.
///
/// Unsupported or empty documents should be filtered out before they are
/// returned.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_all(&self, credential: &Credential) -> Result<Vec<RawDocument>>;
}

/// Turns document bytes into plain text. Output must not contain NUL.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Incremental,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Start,
    Diffing,
    Deleting,
    PerFileProcessing,
    Finalizing,
    Done,
    Failed,
}

/// Progress notifications emitted during a pass.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    Phase(SyncPhase),
    Planned {
        to_process: usize,
        to_delete: usize,
        unchanged: usize,
    },
    FileStarted {
        position: usize,
        total: usize,
        file_id: &'a str,
        name: &'a str,
    },
    FileFinished(&'a FileOutcome),
    DeletionFinished(&'a DeletionOutcome),
}

pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn on_event(&self, _event: &SyncEvent<'_>) {}
}

static NOOP_OBSERVER: NoopObserver = NoopObserver;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileStatus {
    /// Chunks were written. `replaced` counts the previous version's chunks
    /// deleted first, if the file had been indexed before.
    Indexed {
        chunks: usize,
        replaced: Option<usize>,
    },
    /// Nothing to index (e.g. no extractable text). Neither success nor error.
    Skipped { reason: String },
    Failed { stage: FileStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub file_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeletionStatus {
    Deleted { chunks_removed: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionOutcome {
    pub file_id: String,
    #[serde(flatten)]
    pub status: DeletionStatus,
}

/// Result of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub owner: String,
    pub mode: SyncMode,
    pub fetched: usize,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub files: Vec<FileOutcome>,
    pub deletions: Vec<DeletionOutcome>,
    /// Registry writes that failed. The index mutations stand regardless.
    pub state_write_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn begin(owner: &str, mode: SyncMode) -> Self {
        let now = Utc::now();
        Self {
            owner: owner.to_string(),
            mode,
            fetched: 0,
            new: 0,
            modified: 0,
            unchanged: 0,
            files: Vec::new(),
            deletions: Vec::new(),
            state_write_failures: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn files_indexed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Indexed { .. }))
            .count()
    }

    pub fn files_skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Skipped { .. }))
            .count()
    }

    pub fn files_failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Failed { .. }))
            .count()
    }

    pub fn chunks_created(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.status {
                FileStatus::Indexed { chunks, .. } => chunks,
                _ => 0,
            })
            .sum()
    }

    pub fn files_deleted(&self) -> usize {
        self.deletions
            .iter()
            .filter(|d| matches!(d.status, DeletionStatus::Deleted { .. }))
            .count()
    }

    pub fn deletions_failed(&self) -> usize {
        self.deletions.len() - self.files_deleted()
    }

    /// No file, deletion, or registry write failed.
    pub fn is_clean(&self) -> bool {
        self.files_failed() == 0 && self.deletions_failed() == 0 && self.state_write_failures == 0
    }
}

/// Drives sync passes against borrowed collaborators.
pub struct SyncOrchestrator<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    extractor: &'a dyn TextExtractor,
    chunker: &'a Chunker,
    observer: &'a dyn SyncObserver,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn Embedder,
        extractor: &'a dyn TextExtractor,
        chunker: &'a Chunker,
    ) -> Self {
        Self {
            index,
            embedder,
            extractor,
            chunker,
            observer: &NOOP_OBSERVER,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn SyncObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run one pass for `ctx`'s owner. `registry` must belong to that owner.
    pub async fn run(
        &self,
        ctx: &AccessContext,
        source: &dyn DocumentSource,
        registry: &mut SyncRegistry,
        mode: SyncMode,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::begin(ctx.owner(), mode);
        self.phase(SyncPhase::Start);
        info!(owner = ctx.owner(), ?mode, namespace = self.index.namespace(), "sync pass starting");

        if let Err(error) = self.index.initialize().await {
            self.phase(SyncPhase::Failed);
            return Err(SyncError::StoreConnection {
                namespace: self.index.namespace().to_string(),
                error,
            });
        }

        let docs = match source.fetch_all(ctx.credential()).await {
            Ok(docs) => docs,
            Err(error) => {
                self.phase(SyncPhase::Failed);
                return Err(SyncError::SourceFetch {
                    source_name: source.name().to_string(),
                    error,
                });
            }
        };
        report.fetched = docs.len();
        info!(source = source.name(), fetched = docs.len(), "source listed");

        let (to_process, deleted_ids) = match mode {
            SyncMode::Incremental => {
                self.phase(SyncPhase::Diffing);
                let diff = registry.diff(&docs);
                report.new = diff.new.len();
                report.modified = diff.modified.len();
                report.unchanged = diff.unchanged.len();
                // An empty listing usually means an unmounted or unreadable source.
                if docs.is_empty() && !diff.deleted_ids.is_empty() {
                    warn!(
                        source = source.name(),
                        tracked = diff.deleted_ids.len(),
                        "source listed no documents; skipping deletions"
                    );
                    (diff.to_process(), Vec::new())
                } else {
                    (diff.to_process(), diff.deleted_ids)
                }
            }
            SyncMode::Full => {
                let all: Vec<&RawDocument> = docs.iter().collect();
                report.modified = all.iter().filter(|d| registry.contains(&d.id)).count();
                report.new = all.len() - report.modified;
                (all, Vec::new())
            }
        };

        info!(
            new = report.new,
            modified = report.modified,
            unchanged = report.unchanged,
            deleted = deleted_ids.len(),
            "sync plan"
        );
        self.observer.on_event(&SyncEvent::Planned {
            to_process: to_process.len(),
            to_delete: deleted_ids.len(),
            unchanged: report.unchanged,
        });

        if mode == SyncMode::Incremental {
            self.phase(SyncPhase::Deleting);
            for file_id in deleted_ids {
                let outcome = self.delete_file(&file_id, registry, &mut report).await;
                self.observer.on_event(&SyncEvent::DeletionFinished(&outcome));
                report.deletions.push(outcome);
            }
        }

        self.phase(SyncPhase::PerFileProcessing);
        let total = to_process.len();
        for (i, doc) in to_process.into_iter().enumerate() {
            self.observer.on_event(&SyncEvent::FileStarted {
                position: i + 1,
                total,
                file_id: &doc.id,
                name: &doc.name,
            });
            let outcome = self.process_file(doc, registry, &mut report).await;
            self.observer.on_event(&SyncEvent::FileFinished(&outcome));
            report.files.push(outcome);
        }

        self.phase(SyncPhase::Finalizing);
        if let Err(e) = registry.complete_sync(report.files_indexed(), report.chunks_created()) {
            warn!(owner = ctx.owner(), "failed to persist sync totals: {:#}", e);
            report.state_write_failures += 1;
        }
        report.finished_at = Utc::now();

        info!(
            indexed = report.files_indexed(),
            skipped = report.files_skipped(),
            failed = report.files_failed(),
            chunks = report.chunks_created(),
            deleted = report.files_deleted(),
            "sync pass complete"
        );
        self.phase(SyncPhase::Done);
        Ok(report)
    }

    async fn delete_file(
        &self,
        file_id: &str,
        registry: &mut SyncRegistry,
        report: &mut SyncReport,
    ) -> DeletionOutcome {
        let status = match self.index.delete_by_file_id(file_id).await {
            Ok(chunks_removed) => {
                if let Err(e) = registry.remove_file(file_id) {
                    warn!(file_id, "failed to persist removal: {:#}", e);
                    report.state_write_failures += 1;
                }
                info!(file_id, chunks_removed, "removed deleted file");
                DeletionStatus::Deleted { chunks_removed }
            }
            Err(e) => {
                warn!(file_id, "failed to delete chunks: {:#}", e);
                DeletionStatus::Failed {
                    reason: format!("{:#}", e),
                }
            }
        };
        DeletionOutcome {
            file_id: file_id.to_string(),
            status,
        }
    }

    async fn process_file(
        &self,
        doc: &RawDocument,
        registry: &mut SyncRegistry,
        report: &mut SyncReport,
    ) -> FileOutcome {
        let previously_indexed = registry.contains(&doc.id);
        let status = match self.index_file(doc, previously_indexed).await {
            Ok(status) => status,
            Err((stage, e, old_chunks_deleted)) => {
                warn!(file_id = %doc.id, name = %doc.name, %stage, "file failed: {:#}", e);
                // The old version is gone from the index, so the record must go too.
                if old_chunks_deleted {
                    if let Err(e) = registry.remove_file(&doc.id) {
                        warn!(file_id = %doc.id, "failed to persist removal: {:#}", e);
                        report.state_write_failures += 1;
                    }
                }
                FileStatus::Failed {
                    stage,
                    reason: format!("{:#}", e),
                }
            }
        };

        match &status {
            FileStatus::Indexed { chunks, replaced } => {
                if let Err(e) =
                    registry.record_file(&doc.id, &doc.name, &doc.modified_time, *chunks)
                {
                    warn!(file_id = %doc.id, "failed to persist sync record: {:#}", e);
                    report.state_write_failures += 1;
                }
                info!(file_id = %doc.id, name = %doc.name, chunks, replaced = ?replaced, "indexed file");
            }
            FileStatus::Skipped { reason } => {
                info!(file_id = %doc.id, name = %doc.name, reason = %reason, "skipped file");
            }
            FileStatus::Failed { .. } => {}
        }

        FileOutcome {
            file_id: doc.id.clone(),
            name: doc.name.clone(),
            status,
        }
    }

    /// Extract, replace, chunk, embed, and upsert one file. On error, also
    /// reports whether the previous version's chunks were already deleted.
    async fn index_file(
        &self,
        doc: &RawDocument,
        previously_indexed: bool,
    ) -> Result<FileStatus, (FileStage, anyhow::Error, bool)> {
        let text = self
            .extractor
            .extract(&doc.bytes, &doc.mime_type)
            .map_err(|e| (FileStage::Extract, e, false))?;
        if text.trim().is_empty() {
            return Ok(FileStatus::Skipped {
                reason: "no extractable text".to_string(),
            });
        }

        let replaced = if previously_indexed {
            let removed = self
                .index
                .delete_by_file_id(&doc.id)
                .await
                .map_err(|e| (FileStage::Delete, e, false))?;
            debug!(file_id = %doc.id, removed, "deleted previous chunks");
            Some(removed)
        } else {
            None
        };
        let deleted = replaced.is_some();

        let chunks = self
            .chunker
            .chunk(&text, &ChunkMetadata::for_document(doc))
            .map_err(|e| (FileStage::Chunk, e.into(), deleted))?;
        if chunks.is_empty() {
            return Ok(FileStatus::Skipped {
                reason: "no tokens".to_string(),
            });
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = self
                .embedder
                .embed_document(&chunk.text)
                .await
                .map_err(|e| {
                    (
                        FileStage::Embed,
                        e.context(format!("chunk {}", chunk.chunk_index)),
                        deleted,
                    )
                })?;
            embeddings.push(vector);
        }

        self.index
            .upsert_chunks(&chunks, &embeddings)
            .await
            .map_err(|e| (FileStage::Upsert, e, deleted))?;

        Ok(FileStatus::Indexed {
            chunks: chunks.len(),
            replaced,
        })
    }

    fn phase(&self, phase: SyncPhase) {
        debug!(?phase, "sync phase");
        self.observer.on_event(&SyncEvent::Phase(phase));
    }
}

//! Error taxonomy for sync passes and answer attempts.
//!
//! Only the fatal cases are errors. Per-file and per-deletion failures are
//! recorded as values in the [`SyncReport`](crate::sync::SyncReport), and an
//! under-filled permission-filtered search is not an error at all.

use std::fmt;
use thiserror::Error;

/// Fatal sync-pass failure. Nothing has been mutated when one is returned.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The vector index could not be connected or initialized.
    #[error("vector index '{namespace}' unavailable: {error:#}")]
    StoreConnection {
        namespace: String,
        error: anyhow::Error,
    },

    /// The source listing could not be fetched.
    #[error("source '{source_name}' fetch failed: {error:#}")]
    SourceFetch {
        source_name: String,
        error: anyhow::Error,
    },
}

/// A failed answer attempt. Callers may retry the whole call.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("query embedding failed: {error:#}")]
    Embedding { error: anyhow::Error },

    #[error("vector search failed: {error:#}")]
    Search { error: anyhow::Error },

    #[error("generation failed: {error:#}")]
    Generation { error: anyhow::Error },
}

/// Stage of per-file processing at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStage {
    Extract,
    Chunk,
    Embed,
    Upsert,
    Delete,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStage::Extract => "extract",
            FileStage::Chunk => "chunk",
            FileStage::Embed => "embed",
            FileStage::Upsert => "upsert",
            FileStage::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_cause_chain() {
        let err = SyncError::SourceFetch {
            source_name: "filesystem".into(),
            error: anyhow::anyhow!("permission denied").context("listing /data"),
        };
        let msg = err.to_string();
        assert!(msg.contains("filesystem"));
        assert!(msg.contains("listing /data"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(FileStage::Upsert.to_string(), "upsert");
        assert_eq!(
            serde_json::to_string(&FileStage::Extract).unwrap(),
            "\"extract\""
        );
    }
}

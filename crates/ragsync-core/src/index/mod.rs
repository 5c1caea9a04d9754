//! Vector index abstraction.
//!
//! A [`VectorIndex`] handle is bound to one owner namespace (a table or
//! collection) at construction. It stores [`Chunk`]s with their embeddings,
//! ranks them by cosine similarity, and deletes them by source file id.
//!
//! # Permission filtering
//!
//! A filtered search over-fetches `limit * PERMISSION_OVERFETCH` candidates
//! by similarity, keeps those whose `allowed_principals` contain the
//! principal, and truncates to `limit`. No backfill query is issued, so a
//! heavily filtered search may return fewer than `limit` results even when
//! more permitted chunks exist further down the ranking. This is a known
//! limitation of the policy, not an error.
//!
//! Backends:
//!
//! | Backend | Crate | Storage |
//! |---------|-------|---------|
//! | [`InMemoryIndex`](memory::InMemoryIndex) | `ragsync-core` | process memory |
//! | `SqliteIndex` | `ragsync` | one SQLite table per owner |

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, IndexedChunk, SearchResult};

/// Fixed embedding dimensionality of the default models.
pub const EMBEDDING_DIMS: usize = 768;

/// Candidate multiplier for permission-filtered searches.
pub const PERMISSION_OVERFETCH: usize = 3;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Namespace (table/collection) this handle reads and writes.
    fn namespace(&self) -> &str;

    /// Embedding dimensionality the namespace is sized for.
    fn dims(&self) -> usize;

    /// Create the namespace if missing. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Insert chunks with their embeddings (positional 1:1) as new records.
    ///
    /// No merge on id: callers delete a file's stale chunks before
    /// re-inserting it. Returns the store-assigned ids in input order.
    async fn upsert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>])
        -> Result<Vec<String>>;

    /// Rank chunks by descending cosine similarity to `query`.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter_principal: Option<&str>,
    ) -> Result<Vec<SearchResult>>;

    /// Remove every chunk of `file_id`. Returns how many were removed;
    /// zero is not an error.
    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize>;

    /// Number of chunks in the namespace.
    async fn count(&self) -> Result<usize>;

    /// Remove every chunk in the namespace.
    async fn clear(&self) -> Result<usize>;
}

/// How many candidates to rank before permission filtering.
pub fn candidate_limit(limit: usize, filter_principal: Option<&str>) -> usize {
    match filter_principal {
        Some(_) => limit.saturating_mul(PERMISSION_OVERFETCH),
        None => limit,
    }
}

/// Keep candidates visible to `principal` and truncate to `limit`,
/// preserving order.
pub fn filter_by_principal(
    candidates: Vec<SearchResult>,
    filter_principal: Option<&str>,
    limit: usize,
) -> Vec<SearchResult> {
    match filter_principal {
        Some(principal) => candidates
            .into_iter()
            .filter(|r| r.chunk.is_visible_to(principal))
            .take(limit)
            .collect(),
        None => candidates.into_iter().take(limit).collect(),
    }
}

/// Validate an upsert batch: parallel arrays, every vector `dims` long.
pub fn check_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dims: usize) -> Result<()> {
    if chunks.len() != embeddings.len() {
        bail!(
            "chunk/embedding count mismatch: {} chunks, {} embeddings",
            chunks.len(),
            embeddings.len()
        );
    }
    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        if embedding.len() != dims {
            bail!(
                "embedding for {}#{} has {} dims, index expects {}",
                chunk.file_id,
                chunk.chunk_index,
                embedding.len(),
                dims
            );
        }
    }
    Ok(())
}

/// Validate a query vector against the index dimensionality.
pub fn check_query(query: &[f32], dims: usize) -> Result<()> {
    if query.len() != dims {
        bail!("query has {} dims, index expects {}", query.len(), dims);
    }
    Ok(())
}

/// Brute-force ranking shared by backends that score in process.
///
/// Returns the top `candidates` by descending similarity; ties keep
/// insertion order.
pub fn rank_by_similarity<'a, I>(query: &[f32], rows: I, candidates: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = &'a IndexedChunk>,
{
    let mut scored: Vec<SearchResult> = rows
        .into_iter()
        .map(|row| SearchResult {
            id: row.id.clone(),
            chunk: row.chunk.clone(),
            score: cosine_similarity(query, &row.embedding),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(candidates);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn chunk(file_id: &str, principals: &[&str]) -> Chunk {
        Chunk {
            chunk_index: 0,
            text: String::new(),
            start_offset: 0,
            end_offset: 0,
            file_id: file_id.into(),
            name: file_id.into(),
            mime_type: "text/plain".into(),
            source_tag: "test".into(),
            allowed_principals: principals.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            extra: Default::default(),
        }
    }

    fn hit(file_id: &str, principals: &[&str], score: f32) -> SearchResult {
        SearchResult {
            id: file_id.into(),
            chunk: chunk(file_id, principals),
            score,
        }
    }

    #[test]
    fn overfetch_only_when_filtering() {
        assert_eq!(candidate_limit(5, None), 5);
        assert_eq!(candidate_limit(5, Some("ana")), 15);
        assert_eq!(candidate_limit(usize::MAX, Some("ana")), usize::MAX);
    }

    #[test]
    fn filter_keeps_order_and_truncates() {
        let candidates = vec![
            hit("a", &["bo"], 0.9),
            hit("b", &["ana"], 0.8),
            hit("c", &["ana", "bo"], 0.7),
            hit("d", &["ana"], 0.6),
        ];
        let kept = filter_by_principal(candidates, Some("ana"), 2);
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn filter_may_under_return() {
        let candidates = vec![hit("a", &["bo"], 0.9), hit("b", &["ana"], 0.8)];
        assert_eq!(filter_by_principal(candidates, Some("ana"), 5).len(), 1);
    }

    #[test]
    fn batch_checks_lengths_and_dims() {
        let chunks = vec![chunk("f", &[]), chunk("f", &[])];
        assert!(check_batch(&chunks, &[vec![0.0; 4], vec![0.0; 4]], 4).is_ok());
        assert!(check_batch(&chunks, &[vec![0.0; 4]], 4).is_err());
        assert!(check_batch(&chunks, &[vec![0.0; 4], vec![0.0; 3]], 4).is_err());
        assert!(check_query(&[0.0; 3], 4).is_err());
    }

    #[test]
    fn ranking_is_descending() {
        let rows = vec![
            IndexedChunk { id: "x".into(), chunk: chunk("x", &[]), embedding: vec![0.0, 1.0] },
            IndexedChunk { id: "y".into(), chunk: chunk("y", &[]), embedding: vec![1.0, 0.0] },
            IndexedChunk { id: "z".into(), chunk: chunk("z", &[]), embedding: vec![1.0, 1.0] },
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], &rows, 2);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "z"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }
}

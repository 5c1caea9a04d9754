//! In-memory [`VectorIndex`] for tests and ephemeral runs.
//!
//! Namespaces live in a shared map behind `std::sync::RwLock`, so several
//! owner handles created from one [`InMemoryBackend`] see the same store
//! while staying isolated from each other. Search is brute-force cosine
//! similarity.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{
    candidate_limit, check_batch, check_query, filter_by_principal, rank_by_similarity,
    VectorIndex,
};
use crate::models::{Chunk, IndexedChunk, SearchResult};
use crate::namespace::{namespace_name, MAX_NAMESPACE_LEN};

type Namespaces = HashMap<String, Vec<IndexedChunk>>;

/// Shared storage for any number of owner namespaces.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    namespaces: Arc<RwLock<Namespaces>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `owner`'s namespace under `prefix`.
    pub fn index_for(&self, prefix: &str, owner: &str, dims: usize) -> InMemoryIndex {
        InMemoryIndex {
            namespace: namespace_name(prefix, owner, MAX_NAMESPACE_LEN),
            dims,
            namespaces: Arc::clone(&self.namespaces),
        }
    }
}

/// One owner's namespace in an [`InMemoryBackend`].
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    namespace: String,
    dims: usize,
    namespaces: Arc<RwLock<Namespaces>>,
}

impl InMemoryIndex {
    /// Standalone index with its own backend.
    pub fn new(prefix: &str, owner: &str, dims: usize) -> Self {
        InMemoryBackend::new().index_for(prefix, owner, dims)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Namespaces>> {
        self.namespaces
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Namespaces>> {
        self.namespaces
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn missing(&self) -> anyhow::Error {
        anyhow!("namespace '{}' is not initialized", self.namespace)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn initialize(&self) -> Result<()> {
        self.write()?.entry(self.namespace.clone()).or_default();
        debug!(namespace = %self.namespace, dims = self.dims, "in-memory namespace ready");
        Ok(())
    }

    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        check_batch(chunks, embeddings, self.dims)?;

        let mut namespaces = self.write()?;
        let rows = namespaces
            .get_mut(&self.namespace)
            .ok_or_else(|| self.missing())?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = uuid::Uuid::new_v4().to_string();
            rows.push(IndexedChunk {
                id: id.clone(),
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            });
            ids.push(id);
        }
        debug!(namespace = %self.namespace, inserted = ids.len(), "upserted chunks");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter_principal: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        check_query(query, self.dims)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let namespaces = self.read()?;
        let rows = namespaces
            .get(&self.namespace)
            .ok_or_else(|| self.missing())?;

        let candidates = rank_by_similarity(
            query,
            rows.iter(),
            candidate_limit(limit, filter_principal),
        );
        Ok(filter_by_principal(candidates, filter_principal, limit))
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize> {
        let mut namespaces = self.write()?;
        let rows = namespaces
            .get_mut(&self.namespace)
            .ok_or_else(|| self.missing())?;
        let before = rows.len();
        rows.retain(|row| row.chunk.file_id != file_id);
        let removed = before - rows.len();
        debug!(namespace = %self.namespace, file_id, removed, "deleted chunks");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let namespaces = self.read()?;
        Ok(namespaces.get(&self.namespace).map_or(0, Vec::len))
    }

    async fn clear(&self) -> Result<usize> {
        let mut namespaces = self.write()?;
        Ok(namespaces
            .get_mut(&self.namespace)
            .map_or(0, |rows| rows.drain(..).count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const DIMS: usize = 4;

    fn chunk(file_id: &str, index: usize, principals: &[&str]) -> Chunk {
        Chunk {
            chunk_index: index,
            text: format!("{} part {}", file_id, index),
            start_offset: index * 10,
            end_offset: index * 10 + 10,
            file_id: file_id.into(),
            name: format!("{}.txt", file_id),
            mime_type: "text/plain".into(),
            source_tag: "test".into(),
            allowed_principals: principals.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            extra: Default::default(),
        }
    }

    async fn ready(owner: &str) -> InMemoryIndex {
        let index = InMemoryIndex::new("documents", owner, DIMS);
        index.initialize().await.unwrap();
        index
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let index = ready("ana@example.com").await;
        index
            .upsert_chunks(&[chunk("f", 0, &["ana@example.com"])], &[vec![1.0, 0.0, 0.0, 0.0]])
            .await
            .unwrap();
        index.initialize().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.namespace(), "documents_ana_at_example_com");
    }

    #[tokio::test]
    async fn operations_require_initialize() {
        let index = InMemoryIndex::new("documents", "ana@example.com", DIMS);
        assert!(index.search(&[0.0; DIMS], 3, None).await.is_err());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let index = ready("ana").await;
        let ids = index
            .upsert_chunks(
                &[chunk("a", 0, &["ana"]), chunk("b", 0, &["ana"]), chunk("c", 0, &["ana"])],
                &[
                    vec![0.0, 1.0, 0.0, 0.0],
                    vec![1.0, 0.0, 0.0, 0.0],
                    vec![1.0, 1.0, 0.0, 0.0],
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2, None).await.unwrap();
        let files: Vec<&str> = results.iter().map(|r| r.chunk.file_id.as_str()).collect();
        assert_eq!(files, vec!["b", "c"]);
        assert_eq!(results[0].id, ids[1]);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn delete_removes_only_that_file() {
        let index = ready("ana").await;
        index
            .upsert_chunks(
                &[chunk("a", 0, &["ana"]), chunk("a", 1, &["ana"]), chunk("b", 0, &["ana"])],
                &vec![vec![1.0, 0.0, 0.0, 0.0]; 3],
            )
            .await
            .unwrap();

        assert_eq!(index.delete_by_file_id("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_file_id("a").await.unwrap(), 0);
        assert_eq!(index.delete_by_file_id("never-indexed").await.unwrap(), 0);

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 10, None).await.unwrap();
        assert!(results.iter().all(|r| r.chunk.file_id != "a"));
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn filtered_search_never_leaks() {
        let index = ready("ana").await;
        index
            .upsert_chunks(
                &[
                    chunk("secret", 0, &["bo"]),
                    chunk("shared", 0, &["ana", "bo"]),
                    chunk("mine", 0, &["ana"]),
                ],
                &[
                    vec![1.0, 0.0, 0.0, 0.0],
                    vec![0.9, 0.1, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0, 0.0],
                ],
            )
            .await
            .unwrap();

        let results = index
            .search(&[1.0, 0.0, 0.0, 0.0], 5, Some("ana"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.is_visible_to("ana")));
        assert_eq!(results[0].chunk.file_id, "shared");
    }

    #[tokio::test]
    async fn filtered_search_under_returns_past_overfetch_window() {
        let index = ready("ana").await;
        // Three candidates fit in a limit-1 window; the permitted chunk ranks fourth.
        let chunks = vec![
            chunk("x1", 0, &["bo"]),
            chunk("x2", 0, &["bo"]),
            chunk("x3", 0, &["bo"]),
            chunk("ok", 0, &["ana"]),
        ];
        let embeddings = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.1, 0.0, 0.0],
            vec![1.0, 0.2, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ];
        index.upsert_chunks(&chunks, &embeddings).await.unwrap();

        let results = index
            .search(&[1.0, 0.0, 0.0, 0.0], 1, Some("ana"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn owners_are_isolated_on_a_shared_backend() {
        let backend = InMemoryBackend::new();
        let ana = backend.index_for("documents", "ana@example.com", DIMS);
        let bo = backend.index_for("documents", "bo@example.com", DIMS);
        ana.initialize().await.unwrap();
        bo.initialize().await.unwrap();

        ana.upsert_chunks(&[chunk("a", 0, &["ana@example.com"])], &[vec![1.0, 0.0, 0.0, 0.0]])
            .await
            .unwrap();

        assert!(bo.search(&[1.0, 0.0, 0.0, 0.0], 10, None).await.unwrap().is_empty());
        assert_eq!(ana.count().await.unwrap(), 1);
        assert_eq!(bo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_mismatched_batches() {
        let index = ready("ana").await;
        let err = index
            .upsert_chunks(&[chunk("a", 0, &[])], &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dims"));
        assert!(index.upsert_chunks(&[chunk("a", 0, &[])], &[]).await.is_err());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_empties_namespace() {
        let index = ready("ana").await;
        index
            .upsert_chunks(&[chunk("a", 0, &[]), chunk("b", 0, &[])], &[vec![1.0; DIMS], vec![1.0; DIMS]])
            .await
            .unwrap();
        assert_eq!(index.clear().await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 0);
    }
}

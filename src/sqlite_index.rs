//! SQLite-backed [`VectorIndex`].
//!
//! Each owner gets its own table, named `{prefix}_{safe_owner}`, holding one
//! row per chunk with its embedding as a little-endian f32 BLOB. A secondary
//! index on `file_id` keeps deletions cheap. Similarity is computed in
//! process (brute-force cosine) over the owner's rows.
//!
//! `ragsync_namespaces` records each table's dimensionality so a table
//! created for one embedding model is not silently reused by another.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

use ragsync_core::embedding::{blob_to_vec, vec_to_blob};
use ragsync_core::index::{
    candidate_limit, check_batch, check_query, filter_by_principal, rank_by_similarity,
    VectorIndex,
};
use ragsync_core::models::{Chunk, IndexedChunk, SearchResult};
use ragsync_core::namespace::{namespace_name, MAX_NAMESPACE_LEN};

pub struct SqliteIndex {
    pool: SqlitePool,
    table: String,
    dims: usize,
}

impl SqliteIndex {
    /// Handle for `owner`'s table. Nothing is created until
    /// [`initialize`](VectorIndex::initialize).
    pub fn new(pool: SqlitePool, table_prefix: &str, owner: &str, dims: usize) -> Result<Self> {
        if table_prefix.is_empty()
            || !table_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            bail!("invalid table prefix '{}'", table_prefix);
        }
        Ok(Self {
            pool,
            table: namespace_name(table_prefix, owner, MAX_NAMESPACE_LEN),
            dims,
        })
    }
}

fn row_to_indexed(row: &SqliteRow) -> Result<IndexedChunk> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let principals: String = row.try_get("allowed_principals")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let allowed_principals: BTreeSet<String> = serde_json::from_str(&principals)
        .with_context(|| "corrupt allowed_principals column")?;
    let extra: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).with_context(|| "corrupt metadata_json column")?;

    Ok(IndexedChunk {
        id: row.try_get("id")?,
        embedding: blob_to_vec(&blob),
        chunk: Chunk {
            chunk_index: usize::try_from(row.try_get::<i64, _>("chunk_index")?)?,
            text: row.try_get("text")?,
            start_offset: usize::try_from(row.try_get::<i64, _>("start_offset")?)?,
            end_offset: usize::try_from(row.try_get::<i64, _>("end_offset")?)?,
            file_id: row.try_get("file_id")?,
            name: row.try_get("name")?,
            mime_type: row.try_get("mime_type")?,
            source_tag: row.try_get("source_tag")?,
            allowed_principals,
            extra,
        },
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn namespace(&self) -> &str {
        &self.table
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn initialize(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ragsync_namespaces (
                namespace TEXT PRIMARY KEY,
                dims INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                text TEXT NOT NULL,
                file_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                source_tag TEXT NOT NULL,
                allowed_principals TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{{}}'
            )
            "#,
            table = self.table
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"CREATE INDEX IF NOT EXISTS "{table}_file_id_idx" ON "{table}" (file_id)"#,
            table = self.table
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO ragsync_namespaces (namespace, dims, created_at) VALUES (?, ?, ?)",
        )
        .bind(&self.table)
        .bind(self.dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        let stored: i64 = sqlx::query_scalar("SELECT dims FROM ragsync_namespaces WHERE namespace = ?")
            .bind(&self.table)
            .fetch_one(&mut *tx)
            .await?;
        if stored != self.dims as i64 {
            bail!(
                "table '{}' was created for {}-dim embeddings, configured dims is {}",
                self.table,
                stored,
                self.dims
            );
        }

        tx.commit().await?;
        tracing::debug!(table = %self.table, dims = self.dims, "sqlite namespace ready");
        Ok(())
    }

    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        check_batch(chunks, embeddings, self.dims)?;

        let insert = format!(
            r#"
            INSERT INTO "{}" (id, embedding, text, file_id, chunk_index, start_offset,
                              end_offset, name, mime_type, source_tag,
                              allowed_principals, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.table
        );

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(&insert)
                .bind(&id)
                .bind(vec_to_blob(embedding))
                .bind(&chunk.text)
                .bind(&chunk.file_id)
                .bind(chunk.chunk_index as i64)
                .bind(chunk.start_offset as i64)
                .bind(chunk.end_offset as i64)
                .bind(&chunk.name)
                .bind(&chunk.mime_type)
                .bind(&chunk.source_tag)
                .bind(serde_json::to_string(&chunk.allowed_principals)?)
                .bind(serde_json::to_string(&chunk.extra)?)
                .execute(&mut *tx)
                .await?;
            ids.push(id);
        }
        tx.commit().await?;

        tracing::debug!(table = %self.table, inserted = ids.len(), "upserted chunks");
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

        let rows = sqlx::query(&format!(
            r#"SELECT * FROM "{}" ORDER BY rowid"#,
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;
        let stored = rows
            .iter()
            .map(row_to_indexed)
            .collect::<Result<Vec<_>>>()?;

        let candidates = rank_by_similarity(
            query,
            stored.iter(),
            candidate_limit(limit, filter_principal),
        );
        Ok(filter_by_principal(candidates, filter_principal, limit))
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize> {
        let result = sqlx::query(&format!(r#"DELETE FROM "{}" WHERE file_id = ?"#, self.table))
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() as usize;
        tracing::debug!(table = %self.table, file_id, removed, "deleted chunks");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{}""#, self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query(&format!(r#"DELETE FROM "{}""#, self.table))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn chunk(file_id: &str, index: usize, principals: &[&str]) -> Chunk {
        let mut extra = BTreeMap::new();
        extra.insert("modified_time".to_string(), serde_json::json!("t1"));
        Chunk {
            chunk_index: index,
            text: format!("{} chunk {}", file_id, index),
            start_offset: index * 3,
            end_offset: index * 3 + 5,
            file_id: file_id.into(),
            name: format!("{}.md", file_id),
            mime_type: "text/markdown".into(),
            source_tag: "filesystem".into(),
            allowed_principals: principals.iter().map(|p| p.to_string()).collect(),
            extra,
        }
    }

    async fn open(dir: &tempfile::TempDir, owner: &str, dims: usize) -> SqliteIndex {
        let pool = db::connect(&dir.path().join("index.sqlite")).await.unwrap();
        let index = SqliteIndex::new(pool, "documents", owner, dims).unwrap();
        index.initialize().await.unwrap();
        index
    }

    #[tokio::test]
    async fn rows_round_trip_through_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, "ana@example.com", 3).await;
        assert_eq!(index.namespace(), "documents_ana_at_example_com");

        let ids = index
            .upsert_chunks(
                &[chunk("a", 0, &["ana@example.com"]), chunk("b", 0, &["ana@example.com"])],
                &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            )
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ids[0]);
        assert_eq!(results[0].chunk, chunk("a", 0, &["ana@example.com"]));
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn initialize_twice_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, "ana", 2).await;
        index
            .upsert_chunks(&[chunk("a", 0, &["ana"])], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        index.initialize().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dims_change_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _ = open(&dir, "ana", 2).await;
        let pool = db::connect(&dir.path().join("index.sqlite")).await.unwrap();
        let other = SqliteIndex::new(pool, "documents", "ana", 4).unwrap();
        let err = other.initialize().await.unwrap_err();
        assert!(err.to_string().contains("2-dim"));
    }

    #[tokio::test]
    async fn delete_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, "ana", 2).await;
        index
            .upsert_chunks(
                &[chunk("a", 0, &["ana"]), chunk("a", 1, &["ana"]), chunk("b", 0, &["bo"])],
                &[vec![1.0, 0.0], vec![1.0, 0.2], vec![1.0, 0.1]],
            )
            .await
            .unwrap();

        let visible = index.search(&[1.0, 0.0], 10, Some("ana")).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|r| r.chunk.is_visible_to("ana")));

        assert_eq!(index.delete_by_file_id("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_file_id("a").await.unwrap(), 0);
        assert!(index.search(&[1.0, 0.0], 10, Some("ana")).await.unwrap().is_empty());
        assert_eq!(index.clear().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn owners_get_separate_tables() {
        let dir = tempfile::tempdir().unwrap();
        let ana = open(&dir, "ana@example.com", 2).await;
        let bo = open(&dir, "bo@example.com", 2).await;
        ana.upsert_chunks(&[chunk("a", 0, &["ana@example.com", "bo@example.com"])], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        assert!(bo.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        assert_ne!(ana.namespace(), bo.namespace());
    }

    #[tokio::test]
    async fn corrupt_json_columns_fail_the_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, "ana", 2).await;
        index
            .upsert_chunks(&[chunk("a", 0, &["ana"])], &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let table = index.namespace().to_string();
        sqlx::query(&format!(r#"UPDATE "{}" SET metadata_json = 'not json'"#, table))
            .execute(&index.pool)
            .await
            .unwrap();
        let err = index.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("metadata_json"), "{:#}", err);

        sqlx::query(&format!(
            r#"UPDATE "{}" SET metadata_json = '{{}}', allowed_principals = '[oops'"#,
            table
        ))
        .execute(&index.pool)
        .await
        .unwrap();
        let err = index.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("allowed_principals"), "{:#}", err);
    }

    #[tokio::test]
    async fn rejects_unsafe_prefix() {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        assert!(SqliteIndex::new(pool, "a\"; drop", "ana", 2).is_err());
    }
}

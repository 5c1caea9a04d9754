//! Deterministic in-process collaborators for unit tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::context::Credential;
use crate::embedding::{normalize, Embedder};
use crate::generation::Generator;
use crate::index::memory::InMemoryIndex;
use crate::index::VectorIndex;
use crate::models::{Chunk, RawDocument, SearchResult};
use crate::sync::{DocumentSource, TextExtractor};

/// Marker that makes [`FakeEmbedder`] fail on any text containing it.
pub const FAIL_EMBED: &str = "FAIL_EMBED";

/// Mime type [`Utf8Extractor`] refuses.
pub const BROKEN_MIME: &str = "application/x-broken";

pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}

pub fn doc(id: &str, modified: &str, text: &str, principals: &[&str]) -> RawDocument {
    RawDocument {
        id: id.to_string(),
        name: format!("{}.txt", id),
        mime_type: "text/plain".to_string(),
        created_time: "2024-01-01T00:00:00Z".to_string(),
        modified_time: modified.to_string(),
        source_tag: "test".to_string(),
        allowed_principals: principals.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
        bytes: text.as_bytes().to_vec(),
    }
}

/// Hashed bag-of-words embedder. Texts sharing words land close together.
pub struct FakeEmbedder {
    dims: usize,
    pub document_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            document_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    fn vector(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(FAIL_EMBED) {
            bail!("embedding backend rejected input");
        }
        let mut v = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if word.is_empty() {
                continue;
            }
            let digest = Sha256::digest(word.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            v[(u64::from_le_bytes(bucket) % self.dims as u64) as usize] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        normalize(&mut v);
        Ok(v)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        self.vector(text)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.vector(text)
    }
}

/// Generator that records prompts and returns a canned reply.
pub struct FakeGenerator {
    reply: String,
    fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn model_name(&self) -> &str {
        "fake-generator"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            bail!("model overloaded");
        }
        Ok(self.reply.clone())
    }
}

/// Source serving a mutable listing.
#[derive(Default)]
pub struct FakeSource {
    docs: Mutex<Vec<RawDocument>>,
    fail: AtomicBool,
}

impl FakeSource {
    pub fn new(docs: Vec<RawDocument>) -> Self {
        Self {
            docs: Mutex::new(docs),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set(&self, docs: Vec<RawDocument>) {
        *self.docs.lock().unwrap() = docs;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_all(&self, _credential: &Credential) -> Result<Vec<RawDocument>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("listing timed out");
        }
        Ok(self.docs.lock().unwrap().clone())
    }
}

/// Decodes bytes as UTF-8 and strips NULs.
pub struct Utf8Extractor;

impl TextExtractor for Utf8Extractor {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        if mime_type == BROKEN_MIME {
            bail!("unsupported content type {}", mime_type);
        }
        Ok(std::str::from_utf8(bytes)?.replace('\0', ""))
    }
}

/// Wraps an [`InMemoryIndex`] and fails selected operations.
pub struct FlakyIndex {
    pub inner: InMemoryIndex,
    pub fail_initialize: AtomicBool,
    pub fail_deletes_for: Mutex<HashSet<String>>,
}

impl FlakyIndex {
    pub fn new(inner: InMemoryIndex) -> Self {
        Self {
            inner,
            fail_initialize: AtomicBool::new(false),
            fail_deletes_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_delete(&self, file_id: &str) {
        self.fail_deletes_for
            .lock()
            .unwrap()
            .insert(file_id.to_string());
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        self.inner.initialize().await
    }

    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        self.inner.upsert_chunks(chunks, embeddings).await
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter_principal: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.inner.search(query, limit, filter_principal).await
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize> {
        let fail = self.fail_deletes_for.lock().unwrap().contains(file_id);
        if fail {
            bail!("delete of {} timed out", file_id);
        }
        self.inner.delete_by_file_id(file_id).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn clear(&self) -> Result<usize> {
        self.inner.clear().await
    }
}

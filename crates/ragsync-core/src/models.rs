//! Data models that flow through the sync pipeline and the retrieval path.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A document as delivered by a [`DocumentSource`](crate::sync::DocumentSource).
///
/// Produced once per sync pass and never persisted by the core. The
/// `modified_time` is treated as an opaque version marker: any change to
/// the string counts as a modification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub created_time: String,
    pub modified_time: String,
    /// Label of the source that produced the document (e.g. `"filesystem"`).
    pub source_tag: String,
    pub allowed_principals: BTreeSet<String>,
    pub bytes: Vec<u8>,
}

/// Metadata merged verbatim into every chunk of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_id: String,
    pub name: String,
    pub mime_type: String,
    pub source_tag: String,
    pub allowed_principals: BTreeSet<String>,
    /// Additional caller-supplied fields, carried through unvalidated.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Build the per-chunk metadata for a fetched document, including its
    /// created and modified markers as extra fields.
    pub fn for_document(doc: &RawDocument) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert(
            "created_time".to_string(),
            serde_json::Value::String(doc.created_time.clone()),
        );
        extra.insert(
            "modified_time".to_string(),
            serde_json::Value::String(doc.modified_time.clone()),
        );
        Self {
            file_id: doc.id.clone(),
            name: doc.name.clone(),
            mime_type: doc.mime_type.clone(),
            source_tag: doc.source_tag.clone(),
            allowed_principals: doc.allowed_principals.clone(),
            extra,
        }
    }
}

/// A token-bounded slice of a document's extracted text.
///
/// `chunk_index` is only stable within one extraction of one file version;
/// re-chunking a modified file numbers its chunks from zero again.
/// Offsets are token offsets into the extracted text (`end_offset` exclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub file_id: String,
    pub name: String,
    pub mime_type: String,
    pub source_tag: String,
    pub allowed_principals: BTreeSet<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn token_count(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Whether `principal` may read this chunk.
    pub fn is_visible_to(&self, principal: &str) -> bool {
        self.allowed_principals.contains(principal)
    }
}

/// A chunk owned by a vector index, with its embedding and store-assigned id.
///
/// Never mutated in place: updates are delete-then-insert.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One ranked hit from [`VectorIndex::search`](crate::index::VectorIndex::search).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Store-assigned chunk id.
    pub id: String,
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]` (1.0 = identical direction).
    pub score: f32,
}

//! Token-window text chunker.
//!
//! Splits extracted text into overlapping windows of at most `chunk_size`
//! tokens. Consecutive windows share `overlap` tokens, so window `i` starts
//! at token `i * (chunk_size - overlap)`. The final window may be shorter
//! and is never repeated: splitting stops as soon as a window reaches the
//! last token.
//!
//! For `T > 0` tokens the number of chunks is
//! `max(1, ceil((T - overlap) / (chunk_size - overlap)))`.
//!
//! # Example
//!
//! ```rust
//! use ragsync_core::chunk::Chunker;
//! use ragsync_core::models::ChunkMetadata;
//!
//! let chunker = Chunker::new(4, 1).unwrap();
//! let chunks = chunker.chunk("a b c d e f g", &ChunkMetadata::default()).unwrap();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "a b c d");
//! assert_eq!(chunks[1].text, " d e f g");
//! ```

use std::sync::Arc;
use thiserror::Error;

use crate::models::{Chunk, ChunkMetadata};
use crate::tokenize::{Tokenizer, WordTokenizer};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 100;

#[derive(Debug, Error)]
pub enum ChunkError {
    /// The stride `chunk_size - overlap` would not advance.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap { chunk_size: usize, overlap: usize },

    #[error("tokenizer '{tokenizer}' failed: {reason}")]
    Tokenizer { tokenizer: String, reason: String },
}

/// Reject window settings whose stride is not positive.
pub fn validate_window(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if overlap >= chunk_size {
        return Err(ChunkError::InvalidOverlap {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Chunker bound to a tokenizer and window settings.
#[derive(Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .field("tokenizer", &self.tokenizer.name())
            .finish()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            tokenizer: Arc::new(WordTokenizer),
        }
    }
}

impl Chunker {
    /// Chunker using the built-in [`WordTokenizer`].
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        Self::with_tokenizer(chunk_size, overlap, Arc::new(WordTokenizer))
    }

    pub fn with_tokenizer(
        chunk_size: usize,
        overlap: usize,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self, ChunkError> {
        validate_window(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
            tokenizer,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Split `text` into chunks carrying `metadata`.
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str, metadata: &ChunkMetadata) -> Result<Vec<Chunk>, ChunkError> {
        chunk_text(
            text,
            metadata,
            self.chunk_size,
            self.overlap,
            self.tokenizer.as_ref(),
        )
    }
}

/// Split `text` into overlapping token windows.
///
/// Fails with [`ChunkError::InvalidOverlap`] before tokenizing when
/// `overlap >= chunk_size`.
pub fn chunk_text(
    text: &str,
    metadata: &ChunkMetadata,
    chunk_size: usize,
    overlap: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>, ChunkError> {
    validate_window(chunk_size, overlap)?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let tokenizer_error = |reason: String| ChunkError::Tokenizer {
        tokenizer: tokenizer.name().to_string(),
        reason,
    };

    let spans = tokenizer
        .token_spans(text)
        .map_err(|e| tokenizer_error(e.to_string()))?;
    let total = spans.len();
    let stride = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(total / stride + 1);
    let mut start = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total);
        let byte_range = spans[start].start..spans[end - 1].end;
        let piece = text.get(byte_range.clone()).ok_or_else(|| {
            tokenizer_error(format!(
                "token span {:?} is not on a character boundary",
                byte_range
            ))
        })?;

        chunks.push(Chunk {
            chunk_index: chunks.len(),
            text: piece.to_string(),
            start_offset: start,
            end_offset: end,
            file_id: metadata.file_id.clone(),
            name: metadata.name.clone(),
            mime_type: metadata.mime_type.clone(),
            source_tag: metadata.source_tag.clone(),
            allowed_principals: metadata.allowed_principals.clone(),
            extra: metadata.extra.clone(),
        });

        if end == total {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn expected_count(t: usize, c: usize, o: usize) -> usize {
        if t == 0 {
            return 0;
        }
        let remaining = t.saturating_sub(o);
        std::cmp::max(1, (remaining + (c - o) - 1) / (c - o))
    }

    #[test]
    fn default_window_is_500_by_100() {
        let chunker = Chunker::default();
        assert_eq!(chunker.chunk_size(), 500);
        assert_eq!(chunker.overlap(), 100);
        assert_eq!(chunker.stride(), 400);
    }

    #[test]
    fn twelve_hundred_tokens_make_three_chunks() {
        let chunks = Chunker::default()
            .chunk(&words(1200), &ChunkMetadata::default())
            .unwrap();
        let offsets: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.start_offset, c.end_offset))
            .collect();
        assert_eq!(offsets, vec![(0, 500), (400, 900), (800, 1200)]);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("", &ChunkMetadata::default()).unwrap().is_empty());
        assert!(chunker.chunk("   ", &ChunkMetadata::default()).unwrap().is_empty());
        assert!(chunker.chunk("\n\t \n", &ChunkMetadata::default()).unwrap().is_empty());
    }

    #[test]
    fn overlap_not_smaller_than_size_fails_fast() {
        assert!(matches!(
            Chunker::new(100, 100),
            Err(ChunkError::InvalidOverlap { chunk_size: 100, overlap: 100 })
        ));
        assert!(Chunker::new(10, 50).is_err());
        assert!(Chunker::new(0, 0).is_err());

        let err = chunk_text("some text", &ChunkMetadata::default(), 5, 7, &WordTokenizer);
        assert!(matches!(err, Err(ChunkError::InvalidOverlap { .. })));
    }

    #[test]
    fn chunk_count_follows_window_formula() {
        for &(c, o) in &[(500, 100), (10, 3), (7, 0), (4, 3)] {
            let chunker = Chunker::new(c, o).unwrap();
            for t in [1, 2, 3, 9, 10, 11, 57, 400, 501, 1200] {
                let chunks = chunker.chunk(&words(t), &ChunkMetadata::default()).unwrap();
                assert_eq!(
                    chunks.len(),
                    expected_count(t, c, o),
                    "T={} c={} o={}",
                    t,
                    c,
                    o
                );
                assert!(chunks.iter().all(|ch| ch.token_count() <= c));
                assert_eq!(chunks.last().unwrap().end_offset, t);
            }
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap_tokens() {
        let chunker = Chunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&words(57), &ChunkMetadata::default()).unwrap();
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset - pair[1].start_offset, 3);
        }
        let tail: Vec<&str> = chunks[0].text.split_whitespace().rev().take(3).collect();
        let head: Vec<&str> = chunks[1].text.split_whitespace().take(3).collect();
        assert_eq!(tail.into_iter().rev().collect::<Vec<_>>(), head);
    }

    #[test]
    fn chunks_decode_back_to_source_text() {
        let text = "First line.\n\nSecond — with ünïcödé, and punctuation!  Trailing ";
        let chunker = Chunker::new(5, 0).unwrap();
        let chunks = chunker.chunk(text, &ChunkMetadata::default()).unwrap();
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn metadata_is_copied_into_every_chunk() {
        let mut meta = ChunkMetadata {
            file_id: "f-1".into(),
            name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            source_tag: "filesystem".into(),
            allowed_principals: BTreeSet::from(["ana@example.com".to_string()]),
            ..Default::default()
        };
        meta.extra
            .insert("anything".into(), serde_json::json!({"kept": true}));

        let chunks = Chunker::new(3, 1)
            .unwrap()
            .chunk(&words(8), &meta)
            .unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.file_id, "f-1");
            assert_eq!(c.name, "notes.txt");
            assert!(c.is_visible_to("ana@example.com"));
            assert_eq!(c.extra["anything"], serde_json::json!({"kept": true}));
        }
    }
}

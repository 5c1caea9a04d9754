//! Tokenizer selection for the chunker.
//!
//! `"words"` is the built-in Unicode word tokenizer. With the
//! `hf-tokenizer` feature, any other value is read as the path of a
//! Hugging Face `tokenizer.json`, so chunk sizes can be bounded in the
//! embedding model's own tokens.

use std::sync::Arc;

use anyhow::Result;

use ragsync_core::tokenize::{Tokenizer, WordTokenizer};

pub fn build_tokenizer(name: &str) -> Result<Arc<dyn Tokenizer>> {
    match name {
        "words" => Ok(Arc::new(WordTokenizer)),
        #[cfg(feature = "hf-tokenizer")]
        path => Ok(Arc::new(hf::HfTokenizer::from_file(path)?)),
        #[cfg(not(feature = "hf-tokenizer"))]
        other => anyhow::bail!(
            "Unknown tokenizer '{}': only \"words\" is available without --features hf-tokenizer",
            other
        ),
    }
}

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::ops::Range;

    use anyhow::{anyhow, Result};
    use ragsync_core::tokenize::Tokenizer;

    pub struct HfTokenizer {
        name: String,
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &str) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| anyhow!("failed to load tokenizer {}: {}", path, e))?;
            Ok(Self {
                name: path.to_string(),
                inner,
            })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn name(&self) -> &str {
            &self.name
        }

        /// Model offsets skip whitespace and special tokens; spans are
        /// widened so they are contiguous and cover the whole text.
        fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
            let encoding = self
                .inner
                .encode(text, false)
                .map_err(|e| anyhow!("tokenization failed: {}", e))?;
            Ok(contiguous_spans(encoding.get_offsets(), text.len()))
        }
    }

    pub(super) fn contiguous_spans(offsets: &[(usize, usize)], len: usize) -> Vec<Range<usize>> {
        let mut starts: Vec<usize> = offsets
            .iter()
            .filter(|(start, end)| end > start && *end <= len)
            .map(|(start, _)| *start)
            .collect();
        starts.dedup();
        if starts.is_empty() {
            return if len == 0 { Vec::new() } else { vec![0..len] };
        }
        starts[0] = 0;
        let mut spans: Vec<Range<usize>> = starts.windows(2).map(|w| w[0]..w[1]).collect();
        if let Some(&last) = starts.last() {
            spans.push(last..len);
        }
        spans
    }

}

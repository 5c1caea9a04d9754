//! Tokenizers used to bound chunk sizes.
//!
//! A tokenizer maps text to byte spans, one per token. Chunk text is always
//! sliced back out of the original string from those spans, so decoding a
//! run of tokens reproduces the source text exactly.

use anyhow::Result;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into token spans.
pub trait Tokenizer: Send + Sync {
    /// Identifier recorded in logs (e.g. `"words"`).
    fn name(&self) -> &str;

    /// Byte ranges of each token, in order and non-overlapping.
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>>;

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.token_spans(text)?.len())
    }
}

/// Fixed tokenizer over Unicode word boundaries (UAX #29).
///
/// Each word or punctuation segment is one token; whitespace runs attach to
/// the token that follows them (trailing whitespace attaches to the last
/// token). Spans are contiguous and cover the whole input.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        let mut spans: Vec<Range<usize>> = Vec::new();
        let mut pending_ws: Option<usize> = None;

        for (start, segment) in text.split_word_bound_indices() {
            if segment.chars().all(char::is_whitespace) {
                pending_ws.get_or_insert(start);
                continue;
            }
            let begin = pending_ws.take().unwrap_or(start);
            spans.push(begin..start + segment.len());
        }

        if let Some(start) = pending_ws {
            match spans.last_mut() {
                Some(last) => last.end = text.len(),
                None => spans.push(start..text.len()),
            }
        }

        Ok(spans)
    }
}

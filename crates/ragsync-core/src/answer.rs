//! Retrieval-augmented answer assembly.
//!
//! Embeds the question with query intent, searches the owner's index with
//! the owner as filter principal, and asks the generator to answer from the
//! retrieved passages only. When nothing is retrieved, a fixed answer is
//! returned and the generator is never called.

use serde::Serialize;
use tracing::{debug, info};

use crate::context::AccessContext;
use crate::embedding::Embedder;
use crate::error::AnswerError;
use crate::generation::Generator;
use crate::index::VectorIndex;
use crate::models::SearchResult;

pub const DEFAULT_TOP_K: usize = 5;

/// Returned verbatim when retrieval finds nothing.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information in your documents.";

const INSTRUCTION: &str = "You are a helpful assistant answering questions using only the \
provided context from the user's documents. Cite the document names you used. If the context \
does not contain enough information to answer, say so explicitly instead of guessing.";

/// A retrieved passage backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub name: String,
    pub file_id: String,
    pub score: f32,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    /// In retrieval order (descending similarity).
    pub sources: Vec<SourceRef>,
    /// The context block sent to the generator, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Answer {
    fn fallback(question: &str, include_context: bool) -> Self {
        Self {
            question: question.to_string(),
            answer: NO_RESULTS_ANSWER.to_string(),
            sources: Vec::new(),
            context: include_context.then(String::new),
        }
    }
}

/// Label each passage with its ordinal and document name.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Document {}: {}]\n{}", i + 1, r.chunk.name, r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        INSTRUCTION, context, question
    )
}

pub struct AnswerAssembler<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    generator: &'a dyn Generator,
    include_context: bool,
}

impl<'a> AnswerAssembler<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            include_context: false,
        }
    }

    /// Return the assembled context block alongside the answer.
    pub fn include_context(mut self, yes: bool) -> Self {
        self.include_context = yes;
        self
    }

    /// Answer `question` from `ctx`'s owner's documents.
    pub async fn answer(
        &self,
        ctx: &AccessContext,
        question: &str,
        top_k: usize,
    ) -> Result<Answer, AnswerError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(Answer::fallback(question, self.include_context));
        }

        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|error| AnswerError::Embedding { error })?;

        let results = self
            .index
            .search(&query, top_k, Some(ctx.filter_principal()))
            .await
            .map_err(|error| AnswerError::Search { error })?;
        debug!(owner = ctx.owner(), top_k, retrieved = results.len(), "retrieval done");

        if results.is_empty() {
            info!(owner = ctx.owner(), "no relevant chunks, returning fallback answer");
            return Ok(Answer::fallback(question, self.include_context));
        }

        let context = build_context(&results);
        let prompt = build_prompt(&context, question);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|error| AnswerError::Generation { error })?;

        let sources = results
            .iter()
            .map(|r| SourceRef {
                name: r.chunk.name.clone(),
                file_id: r.chunk.file_id.clone(),
                score: r.score,
                chunk_index: r.chunk.chunk_index,
            })
            .collect();

        Ok(Answer {
            question: question.to_string(),
            answer,
            sources,
            context: self.include_context.then_some(context),
        })
    }
}

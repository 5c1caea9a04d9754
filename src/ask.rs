//! `ragsync ask`: answer a question from the owner's indexed documents.

use anyhow::Result;

use ragsync_core::answer::{Answer, AnswerAssembler};
use ragsync_core::context::AccessContext;
use ragsync_core::index::VectorIndex;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::index::open_index;

pub async fn run_ask(
    config: &Config,
    owner: &str,
    question: &str,
    top_k: Option<usize>,
    show_context: bool,
    json: bool,
) -> Result<Answer> {
    let index = open_index(&config.index, owner).await?;
    let embedder = create_embedder(&config.embedding, config.index.dims)?;
    let generator = create_generator(&config.generation)?;
    let assembler = AnswerAssembler::new(index.as_ref(), embedder.as_ref(), generator.as_ref())
        .include_context(show_context || config.retrieval.include_context);

    let answer = answer_question(
        &assembler,
        index.as_ref(),
        &AccessContext::new(owner),
        question,
        top_k.unwrap_or(config.retrieval.top_k),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(answer)
}

/// Answer `question` for `ctx`, creating the owner's namespace first so a
/// never-synced owner gets the fallback answer instead of a storage error.
pub async fn answer_question(
    assembler: &AnswerAssembler<'_>,
    index: &dyn VectorIndex,
    ctx: &AccessContext,
    question: &str,
    top_k: usize,
) -> Result<Answer> {
    index.initialize().await?;
    Ok(assembler.answer(ctx, question, top_k).await?)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. {}  (score {:.3}, chunk {})",
                i + 1,
                source.name,
                source.score,
                source.chunk_index
            );
        }
    }
    if let Some(context) = answer.context.as_deref().filter(|c| !c.is_empty()) {
        println!();
        println!("Context:");
        println!("{}", context);
    }
}

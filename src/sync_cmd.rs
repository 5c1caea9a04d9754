//! `ragsync init`, `ragsync sync`, and `ragsync reset`.

use anyhow::{anyhow, Result};

use ragsync_core::chunk::Chunker;
use ragsync_core::context::AccessContext;
use ragsync_core::sync::{FileStatus, SyncMode, SyncOrchestrator, SyncReport};
use ragsync_core::sync_state::SyncRegistry;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::FormatExtractor;
use crate::index::open_index;
use crate::progress::{format_number, ProgressMode};
use crate::source_fs::FilesystemSource;
use crate::state_store::JsonFileStore;
use crate::tokenizer::build_tokenizer;

pub fn build_chunker(config: &Config) -> Result<Chunker> {
    let tokenizer = build_tokenizer(&config.chunking.tokenizer)?;
    Ok(Chunker::with_tokenizer(
        config.chunking.chunk_size,
        config.chunking.overlap,
        tokenizer,
    )?)
}

pub fn open_registry(config: &Config, owner: &str) -> SyncRegistry {
    SyncRegistry::open(owner, Box::new(JsonFileStore::new(&config.state.dir)))
}

/// Create the owner's index namespace. Idempotent.
pub async fn run_init(config: &Config, owner: &str) -> Result<()> {
    let index = open_index(&config.index, owner).await?;
    index.initialize().await?;
    println!(
        "Initialized namespace {} ({} dims) for {}.",
        index.namespace(),
        index.dims(),
        owner
    );
    Ok(())
}

/// Run one sync pass for `owner` against the configured source.
pub async fn run_sync(
    config: &Config,
    owner: &str,
    mode: SyncMode,
    progress: ProgressMode,
    json: bool,
) -> Result<SyncReport> {
    let source_config = config
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("no [source] configured"))?;
    let source = FilesystemSource::new(source_config, owner)?;
    let index = open_index(&config.index, owner).await?;
    let embedder = create_embedder(&config.embedding, config.index.dims)?;
    let chunker = build_chunker(config)?;
    let extractor = FormatExtractor;
    let observer = progress.observer(owner);
    let mut registry = open_registry(config, owner);

    let report = SyncOrchestrator::new(index.as_ref(), embedder.as_ref(), &extractor, &chunker)
        .with_observer(observer.as_ref())
        .run(&AccessContext::new(owner), &source, &mut registry, mode)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &SyncReport) {
    println!("sync {} ({:?})", report.owner, report.mode);
    println!(
        "  listed:    {}  (new {}, modified {}, unchanged {})",
        format_number(report.fetched as u64),
        report.new,
        report.modified,
        report.unchanged
    );
    println!(
        "  indexed:   {} files, {} chunks",
        report.files_indexed(),
        format_number(report.chunks_created() as u64)
    );
    println!("  skipped:   {}", report.files_skipped());
    println!("  deleted:   {}", report.files_deleted());

    let failures: Vec<String> = report
        .files
        .iter()
        .filter_map(|f| match &f.status {
            FileStatus::Failed { stage, reason } => {
                Some(format!("{} ({}): {}", f.file_id, stage, reason))
            }
            _ => None,
        })
        .collect();
    if !failures.is_empty() || report.deletions_failed() > 0 {
        println!(
            "  failed:    {} files, {} deletions",
            failures.len(),
            report.deletions_failed()
        );
        for failure in failures {
            println!("    - {}", failure);
        }
    }
    if report.state_write_failures > 0 {
        println!(
            "  warning:   {} sync-state writes failed; the next pass may redo work",
            report.state_write_failures
        );
    }
    let elapsed = report.finished_at - report.started_at;
    println!("  took:      {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

/// Drop the owner's chunks and forget their sync state.
pub async fn run_reset(config: &Config, owner: &str) -> Result<()> {
    let index = open_index(&config.index, owner).await?;
    index.initialize().await?;
    let removed = index.clear().await?;
    let mut registry = open_registry(config, owner);
    registry.reset()?;
    println!(
        "Reset {}: removed {} chunks from {}, cleared sync state.",
        owner,
        format_number(removed as u64),
        index.namespace()
    );
    Ok(())
}

//! `ragsync status`: what is indexed for an owner.

use anyhow::Result;

use crate::config::Config;
use crate::index::open_index;
use crate::progress::format_number;
use crate::sync_cmd::open_registry;

pub async fn run_status(config: &Config, owner: &str, json: bool) -> Result<()> {
    let registry = open_registry(config, owner);
    let stats = registry.stats();
    let index = open_index(&config.index, owner).await?;
    index.initialize().await?;
    let chunks = index.count().await?;

    if json {
        let obj = serde_json::json!({
            "namespace": index.namespace(),
            "dims": index.dims(),
            "chunks": chunks,
            "sync": stats,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("ragsync status for {}", owner);
    println!("================================");
    println!();
    println!(
        "  Namespace:   {} ({} dims, {})",
        index.namespace(),
        index.dims(),
        config.index.provider
    );
    println!("  Chunks:      {}", format_number(chunks as u64));
    println!("  Files:       {}", format_number(stats.files_tracked as u64));
    println!(
        "  Last sync:   {}",
        stats
            .last_sync_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Syncs:       {}", stats.total_syncs);
    println!(
        "  Processed:   {} files, {} chunks (all time)",
        format_number(stats.total_files_processed),
        format_number(stats.total_chunks_created)
    );
    Ok(())
}

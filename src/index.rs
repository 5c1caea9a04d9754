//! Vector index construction from `[index]` config.

use anyhow::{bail, Result};

use ragsync_core::index::memory::InMemoryIndex;
use ragsync_core::index::VectorIndex;

use crate::config::IndexConfig;
use crate::db;
use crate::sqlite_index::SqliteIndex;

/// Open `owner`'s index namespace. Nothing is created until
/// [`VectorIndex::initialize`] runs.
///
/// The `memory` provider lives for the life of the process only.
pub async fn open_index(config: &IndexConfig, owner: &str) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "sqlite" => {
            let pool = db::connect(&config.path).await?;
            Ok(Box::new(SqliteIndex::new(
                pool,
                &config.table_prefix,
                owner,
                config.dims,
            )?))
        }
        "memory" => Ok(Box::new(InMemoryIndex::new(
            &config.table_prefix,
            owner,
            config.dims,
        ))),
        other => bail!("Unknown index provider: {}", other),
    }
}

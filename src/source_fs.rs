//! Filesystem document source.
//!
//! Walks `[source] root`, keeps files matching the include globs and not
//! the exclude globs (VCS and build directories are always excluded), and
//! lists them as [`RawDocument`]s. The document id is the path relative
//! to the root, so renaming a file shows up as one deletion plus one new
//! file. Files with an unknown extension, no content, or more than
//! `max_file_bytes` are left out of the listing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use ragsync_core::context::Credential;
use ragsync_core::models::RawDocument;
use ragsync_core::sync::DocumentSource;

use crate::config::SourceConfig;
use crate::extract::{MIME_DOCX, MIME_JSON, MIME_PDF, MIME_PPTX, MIME_XLSX};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Clone)]
pub struct FilesystemSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    principals: BTreeSet<String>,
    source_tag: String,
    max_file_bytes: u64,
}

impl FilesystemSource {
    /// `owner` is the sole principal when none are configured.
    pub fn new(config: &SourceConfig, owner: &str) -> Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.iter().cloned());

        let principals = if config.allowed_principals.is_empty() {
            BTreeSet::from([owner.to_string()])
        } else {
            config.allowed_principals.iter().cloned().collect()
        };

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
            principals,
            source_tag: config.source_tag.clone(),
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> Result<Vec<RawDocument>> {
        if !self.root.is_dir() {
            bail!("source root does not exist: {}", self.root.display());
        }

        let mut docs = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            let Some(mime_type) = mime_for_path(path) else {
                debug!(file = %rel_str, "skipping file with unknown type");
                continue;
            };
            let metadata = entry.metadata()?;
            if metadata.len() == 0 || metadata.len() > self.max_file_bytes {
                debug!(file = %rel_str, bytes = metadata.len(), "skipping empty or oversize file");
                continue;
            }

            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let created = metadata.created().unwrap_or(modified);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| rel_str.clone());

            docs.push(RawDocument {
                id: rel_str,
                name,
                mime_type: mime_type.to_string(),
                created_time: rfc3339(created),
                modified_time: rfc3339(modified),
                source_tag: self.source_tag.clone(),
                allowed_principals: self.principals.clone(),
                bytes,
            });
        }

        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> &str {
        &self.source_tag
    }

    async fn fetch_all(&self, _credential: &Credential) -> Result<Vec<RawDocument>> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.scan()).await?
    }
}

/// Mime type from the file extension; `None` for types that are not synced.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => MIME_JSON,
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        _ => return None,
    })
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| anyhow!("invalid glob '{}': {}", pattern, e))?);
    }
    Ok(builder.build()?)
}

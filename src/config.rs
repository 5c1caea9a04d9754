//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so a minimal file
//! only needs `[owner] key` and a `[source]` root. API keys are read from
//! the environment by the providers, never from this file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragsync_core::chunk::{validate_window, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use ragsync_core::index::EMBEDDING_DIMS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub owner: OwnerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OwnerConfig {
    /// Identity the index and registry are namespaced by (usually an email).
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".sync_state")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"sqlite"` or `"memory"`.
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            path: default_index_path(),
            table_prefix: default_table_prefix(),
            dims: default_dims(),
        }
    }
}

fn default_index_provider() -> String {
    "sqlite".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/ragsync.sqlite")
}
fn default_table_prefix() -> String {
    "documents".to_string()
}
fn default_dims() -> usize {
    EMBEDDING_DIMS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// `"words"`, or a path to a `tokenizer.json` (needs `hf-tokenizer`).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}
fn default_tokenizer() -> String {
    "words".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub include_context: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            include_context: false,
        }
    }
}

fn default_top_k() -> usize {
    ragsync_core::answer::DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"`, `"ollama"`, `"gemini"`, or `"local"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"disabled"`, `"ollama"`, or `"gemini"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Principals stamped on every document. Empty means the owner alone.
    #[serde(default)]
    pub allowed_principals: Vec<String>,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.md", "**/*.txt", "**/*.csv", "**/*.pdf", "**/*.docx", "**/*.pptx", "**/*.xlsx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_source_tag() -> String {
    "filesystem".to_string()
}
fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}

impl Config {
    /// Owner for this run: the CLI override, else `[owner] key`.
    pub fn resolve_owner(&self, cli_owner: Option<&str>) -> Result<String> {
        let owner = cli_owner
            .map(str::to_string)
            .or_else(|| self.owner.key.clone())
            .map(|o| o.trim().to_string())
            .unwrap_or_default();
        if owner.is_empty() {
            bail!("no owner configured: set [owner] key or pass --owner");
        }
        Ok(owner)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    validate_window(config.chunking.chunk_size, config.chunking.overlap)
        .with_context(|| "invalid [chunking] settings")?;

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.index.provider.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown index provider: '{}'. Must be sqlite or memory.",
            other
        ),
    }
    if config.index.dims == 0 {
        bail!("index.dims must be > 0");
    }
    // Interpolated into SQL as a table name.
    let prefix = &config.index.table_prefix;
    if !prefix.starts_with(|c: char| c.is_ascii_lowercase())
        || !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        || prefix.len() > 32
    {
        bail!(
            "index.table_prefix '{}' must be 1-32 chars of [a-z0-9_] starting with a letter",
            prefix
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "gemini" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, gemini, or local.",
            other
        ),
    }
    match config.generation.provider.as_str() {
        "disabled" | "ollama" | "gemini" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, ollama, or gemini.",
            other
        ),
    }

    if let Some(source) = &config.source {
        if source.include_globs.is_empty() {
            bail!("source.include_globs must not be empty");
        }
        if source.max_file_bytes == 0 {
            bail!("source.max_file_bytes must be > 0");
        }
    }

    Ok(config)
}

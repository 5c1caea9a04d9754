//! Embedding providers.
//!
//! - **[`DisabledEmbedder`]**: returns errors; used when no provider is configured.
//! - **[`OllamaEmbedder`]**: `POST /api/embed` on a local Ollama instance.
//! - **[`GeminiEmbedder`]**: Google `embedContent` with retrieval task types.
//! - **`LocalEmbedder`**: nomic-embed-text-v1.5 in process via fastembed
//!   (feature `local-embeddings-fastembed`).
//!
//! Document and query embeddings share one vector space but are framed
//! differently: nomic-style models get `search_document: ` /
//! `search_query: ` prefixes, Gemini gets `RETRIEVAL_DOCUMENT` /
//! `RETRIEVAL_QUERY` task types.
//!
//! ```rust,no_run
//! # use ragsync::config::EmbeddingConfig;
//! # use ragsync::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config, 768).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use ragsync_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http;

pub const DOCUMENT_PREFIX: &str = "search_document: ";
pub const QUERY_PREFIX: &str = "search_query: ";

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";
pub(crate) const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "text-embedding-004";

/// Read the Gemini API key from the environment.
pub(crate) fn gemini_api_key() -> Result<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .map_err(|_| anyhow!("GEMINI_API_KEY (or GOOGLE_API_KEY) environment variable not set"))
}

fn check_dims(service: &str, vector: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if vector.len() != dims {
        bail!(
            "{} returned a {}-dim embedding, expected {}",
            service,
            vector.len(),
            dims
        );
    }
    Ok(vector)
}

fn json_floats(values: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    values
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid {} response: non-numeric value", what))
        })
        .collect()
}

// ============ Disabled ============

pub struct DisabledEmbedder {
    dims: usize,
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }
}

// ============ Ollama ============

/// Requires Ollama running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string()),
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            &[],
            &body,
            self.max_retries,
        )
        .await?;
        check_dims("Ollama", parse_ollama_response(&json)?, self.dims)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;
    json_floats(first, "Ollama")
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(format!("{}{}", DOCUMENT_PREFIX, text)).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(format!("{}{}", QUERY_PREFIX, text)).await
    }
}

// ============ Gemini ============

pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_URL.to_string()),
            api_key: gemini_api_key()?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn embed(&self, text: &str, task_type: &str) -> Result<Vec<f32>> {
        let model = self.model.trim_start_matches("models/");
        let body = serde_json::json!({
            "model": format!("models/{}", model),
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type,
            "outputDimensionality": self.dims,
        });
        let json = http::post_json(
            &self.client,
            "Gemini",
            &format!(
                "{}/models/{}:embedContent",
                self.base_url.trim_end_matches('/'),
                model
            ),
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
            self.max_retries,
        )
        .await?;
        check_dims("Gemini", parse_gemini_response(&json)?, self.dims)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embedding.values"))?;
    json_floats(values, "Gemini")
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, "RETRIEVAL_QUERY").await
    }
}

// ============ Local (fastembed) ============

/// nomic-embed-text-v1.5 run in process. The model is downloaded from
/// Hugging Face on first use and cached; later runs are offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
    dims: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    const MODEL_NAME: &'static str = "nomic-embed-text-v1.5";
    const MODEL_DIMS: usize = 768;

    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        if let Some(model) = &config.model {
            if model != Self::MODEL_NAME {
                bail!(
                    "Unknown local embedding model: '{}'. Supported: {}",
                    model,
                    Self::MODEL_NAME
                );
            }
        }
        if dims != Self::MODEL_DIMS {
            bail!(
                "{} produces {}-dim embeddings but index.dims is {}",
                Self::MODEL_NAME,
                Self::MODEL_DIMS,
                dims
            );
        }
        Ok(Self {
            model: Default::default(),
            dims,
        })
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let model = std::sync::Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(loaded);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model unavailable"))?;
            let mut out = embedder
                .embed(vec![text], None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))?;
            out.pop()
                .ok_or_else(|| anyhow!("Local embedding returned no vector"))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(format!("{}{}", DOCUMENT_PREFIX, text)).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(format!("{}{}", QUERY_PREFIX, text)).await
    }
}

/// Build the configured embedder for an index of `dims` dimensions.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder { dims })),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config, dims)?)),
        "gemini" => Ok(Box::new(GeminiEmbedder::new(config, dims)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalEmbedder::new(config, dims)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, -1.0, 2.0]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![0.5, -1.0, 2.0]);
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [] })).is_err());
        assert!(parse_ollama_response(&serde_json::json!({ "error": "model not found" })).is_err());
    }

    #[test]
    fn parses_gemini_response() {
        let json = serde_json::json!({ "embedding": { "values": [0.25, 0.75] } });
        assert_eq!(parse_gemini_response(&json).unwrap(), vec![0.25, 0.75]);
        let bad = serde_json::json!({ "embedding": { "values": ["x"] } });
        assert!(parse_gemini_response(&bad).is_err());
    }

    #[test]
    fn wrong_dimensionality_is_rejected() {
        assert!(check_dims("Ollama", vec![0.0; 384], 768).is_err());
        assert_eq!(check_dims("Ollama", vec![0.0; 4], 4).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let embedder = create_embedder(&EmbeddingConfig::default(), 768).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert_eq!(embedder.dims(), 768);
        assert!(embedder.embed_document("text").await.is_err());
        assert!(embedder.embed_query("text").await.is_err());
    }

    #[test]
    fn unknown_provider_errors() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        assert!(create_embedder(&config, 768).is_err());
    }
}

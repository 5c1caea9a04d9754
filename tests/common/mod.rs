#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;

use ragsync::config::SourceConfig;
use ragsync_core::embedding::{normalize, Embedder};
use ragsync_core::generation::Generator;

pub const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: texts sharing words point the
/// same way.
pub struct HashEmbedder {
    pub document_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            document_calls: AtomicUsize::new(0),
        }
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() % DIMS as u64) as usize] += 1.0;
        }
        v[0] += 0.01;
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector_for(text))
    }
}

/// Replies with a fixed answer and keeps the prompts it was sent.
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Answer from the documents.".to_string())
    }
}

pub fn source_config(root: &Path) -> SourceConfig {
    SourceConfig {
        root: root.to_path_buf(),
        include_globs: vec![
            "**/*.md".into(),
            "**/*.txt".into(),
            "**/*.pdf".into(),
            "**/*.docx".into(),
            "**/*.xlsx".into(),
        ],
        exclude_globs: Vec::new(),
        follow_symlinks: false,
        allowed_principals: Vec::new(),
        source_tag: "filesystem".into(),
        max_file_bytes: 1024 * 1024,
    }
}

/// Write `content` to `path` and move its mtime `secs_ahead` into the
/// future so successive writes always look modified.
pub fn write_file(path: &Path, content: &[u8], secs_ahead: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(path).unwrap();
    file.write_all(content).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead))
        .unwrap();
}

/// A .docx with one paragraph per entry of `paragraphs`.
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    zip_entries(&[("word/document.xml", xml)])
}

pub fn zip_entries(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, content) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

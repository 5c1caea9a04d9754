//! # ragsync
//!
//! Per-user incremental document sync into a vector index, and
//! retrieval-augmented answers over what was synced.
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │   Source    │──▶│   Sync orchestrator  │──▶│ Vector index │
//! │ (files)     │   │ diff/extract/chunk/  │   │ (per owner)  │
//! └─────────────┘   │ embed/upsert/delete  │   └──────┬───────┘
//!                   └──────────┬───────────┘          │
//!                              ▼                      ▼
//!                      ┌──────────────┐       ┌──────────────┐
//!                      │  Sync state  │       │    Answer    │
//!                      │ (JSON/owner) │       │  assembler   │
//!                      └──────────────┘       └──────────────┘
//! ```
//!
//! The I/O-free pieces (chunker, registry, orchestrator, assembler, traits)
//! live in `ragsync-core`; this crate wires them to SQLite, the filesystem,
//! model providers over HTTP, and the `ragsync` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! ragsync --owner ana@example.com init
//! ragsync --owner ana@example.com sync
//! ragsync --owner ana@example.com ask "What did Q3 revenue look like?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`sqlite_index`] | SQLite vector index backend |
//! | [`index`] | Index construction from config |
//! | [`state_store`] | JSON-file sync-state persistence |
//! | [`source_fs`] | Filesystem document source |
//! | [`extract`] | Text extraction (PDF, OOXML, text) |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`tokenizer`] | Chunker tokenizer selection |
//! | [`progress`] | Sync progress on stderr |
//! | [`sync_cmd`], [`ask`], [`status`] | CLI commands |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod index;
pub mod progress;
pub mod source_fs;
pub mod sqlite_index;
pub mod state_store;
pub mod status;
pub mod sync_cmd;
pub mod tokenizer;

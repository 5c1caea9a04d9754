//! # ragsync core
//!
//! I/O-free logic for ragsync: data models, token chunking, the per-owner
//! sync registry and its diff, the vector index abstraction, the incremental
//! sync orchestrator, and retrieval-augmented answer assembly.
//!
//! Everything that touches the outside world (document sources, text
//! extraction, embedding and generation models, durable storage) is reached
//! through a trait defined here and implemented by the `ragsync` app crate,
//! or by the in-memory implementations in this crate for tests.
//!
//! ```text
//! DocumentSource ──▶ SyncOrchestrator ──▶ VectorIndex ◀── AnswerAssembler
//!                     │  │   │                              │      │
//!                     │  │   └─ Embedder (document)  Embedder (query)
//!                     │  └─ Chunker                         Generator
//!                     └─ SyncRegistry ──▶ StatePersistence
//! ```

pub mod answer;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod namespace;
pub mod sync;
pub mod sync_state;
pub mod tokenize;

#[cfg(test)]
pub(crate) mod testing;

//! # docqa-core
//!
//! Core retrieval-augmented generation pipeline for document Q&A:
//! chunking with positional metadata, vector indexing with
//! diversity-aware retrieval, and the streaming answer orchestrator.
//!
//! The crate is provider- and transport-agnostic. Embedding and
//! generation backends plug in through the [`provider`] traits, storage
//! through the [`index`] and [`repository`] traits; the application
//! crate wires concrete implementations (OpenAI, HTTP server, CLI).
//!
//! ```text
//! pages ──▶ chunker ──▶ index (write)
//!
//! question ──▶ orchestrator ──▶ retriever ──▶ index (read)
//!                   │
//!                   ├──▶ generation provider
//!                   ▼
//!             stream events (citations, tokens, complete)
//! ```

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod repository;
pub mod retriever;
pub mod sse;

pub use error::{RagError, Result};
pub use models::{
    AskRequest, Chunk, Citation, Document, DocumentStatus, FinalResponse, Page, StreamEvent, Usage,
};
pub use orchestrator::Orchestrator;

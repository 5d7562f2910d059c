//! Error taxonomy for the question-answering pipeline.
//!
//! Each variant maps to a distinct failure class with its own
//! propagation rule:
//!
//! - [`RagError::Validation`] — bad input, rejected before any side
//!   effect or stream event.
//! - [`RagError::Extraction`] — a source document yielded no usable
//!   text; the owning document is marked failed during ingestion.
//! - [`RagError::Index`] — an embedding or vector-index operation
//!   failed (embedding failures surface here: the index cannot be
//!   read or written without vectors).
//! - [`RagError::Generation`] — the generation provider failed, which
//!   mid-stream becomes a single `error` event ending the stream.
//!
//! Nothing in this crate retries a failed provider call; a transient
//! failure is terminal for that request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no extractable text: {0}")]
    Extraction(String),

    #[error("index operation failed: {0}")]
    Index(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

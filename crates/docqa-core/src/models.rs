//! Core data models for the document question-answering pipeline.
//!
//! These types flow through ingestion (documents, chunks) and the ask
//! path (requests, citations, stream events). Serialized shapes match
//! the wire contract in `sse.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of chunks retrieved per question.
pub const DEFAULT_K: usize = 6;
/// Upper bound on `k` accepted from callers.
pub const MAX_K: usize = 20;
/// Maximum question length in characters.
pub const MAX_QUESTION_LEN: usize = 1000;
/// Maximum citation excerpt length before the ellipsis is appended.
pub const EXCERPT_LEN: usize = 200;

/// Lifecycle status of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Failed,
}

/// An uploaded document and its ingestion state.
///
/// Created when ingestion starts, mutated only by the ingestion
/// pipeline. The ask path reads documents but never changes them.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub page_count: Option<usize>,
    pub chunk_count: Option<usize>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of extracted text, numbered from 1.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_number: usize,
    pub text: String,
}

/// A bounded passage of a document's text with positional metadata.
///
/// Immutable once created; re-ingesting a document replaces its chunk
/// set wholesale. `char_start`/`char_end` are approximate offsets into
/// the page's extracted text (see `chunker` for the known limitation).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `"{doc_id}_chunk_{n}"` with `n` monotonic across the document.
    pub id: String,
    pub doc_id: String,
    pub page: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    /// Source tag, `"page_{page}"`.
    pub source: String,
}

/// A reference back to the source chunk backing part of an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    /// Truncated label, `"Document {first 8 chars of doc_id}"`.
    pub doc_name: String,
    pub page: usize,
    /// Cosine similarity between the query and the cited chunk.
    pub score: f32,
    /// At most 200 characters of chunk text, plus `"..."` if truncated.
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,
}

/// Token accounting attached to a completed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Number of chunks retrieved for the answer.
    pub retrieved_docs: usize,
    /// Rough token estimate: whitespace word count of the answer.
    pub total_tokens: usize,
}

/// The final payload of a completed ask request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub usage: Usage,
    pub latency_ms: u64,
}

/// One event in the ordered stream produced per ask request.
///
/// Ordering guarantee: all `Citation` events precede the first `Token`;
/// `Complete` or `Error` is last and emitted exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Token { content: String },
    Citation { citation: Citation },
    Complete { final_response: FinalResponse },
    Error { error: String },
}

/// Input contract for one ask request.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(skip)]
    pub user_id: String,
    #[serde(default)]
    pub doc_ids: Option<Vec<String>>,
    #[serde(default)]
    pub k: Option<usize>,
}

impl Citation {
    /// Build a citation from a retrieved chunk and its relevance score.
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        let excerpt = if chunk.text.chars().count() > EXCERPT_LEN {
            let head: String = chunk.text.chars().take(EXCERPT_LEN).collect();
            format!("{head}...")
        } else {
            chunk.text.clone()
        };
        let label: String = chunk.doc_id.chars().take(8).collect();
        Citation {
            doc_id: chunk.doc_id.clone(),
            doc_name: format!("Document {label}"),
            page: chunk.page,
            score,
            excerpt,
            char_start: Some(chunk.char_start),
            char_end: Some(chunk.char_end),
        }
    }
}

//! Application layer for the document Q&A service.
//!
//! Wires the [`docqa_core`] pipeline to the outside world: TOML
//! configuration, PDF text extraction, OpenAI providers, the ingestion
//! pipeline, and the HTTP API.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`extract`] | PDF page text extraction and cleanup |
//! | [`openai`] | OpenAI embedding and streaming generation providers |
//! | [`ingest`] | Upload-to-index pipeline with status tracking |
//! | [`server`] | Axum HTTP API with SSE `/ask` |

pub mod config;
pub mod extract;
pub mod ingest;
pub mod openai;
pub mod server;

//! Provider capability traits.
//!
//! The pipeline is provider-agnostic: anything that can turn text into
//! vectors and a prompt into a stream of text deltas can back it. The
//! concrete OpenAI implementations live in the application crate;
//! tests use deterministic in-process fakes.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// A finite, ordered stream of generation deltas. Not restartable:
/// once consumed (or dropped) the generation is over.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Turns text into fixed-dimension embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality; every returned vector has this length.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces an incremental text completion for a prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Start a completion and return its delta stream. Errors raised
    /// by the stream itself are mid-generation failures.
    async fn generate(&self, prompt: &str) -> Result<TokenStream>;
}

//! OpenAI-backed embedding and generation providers.
//!
//! Both providers read `OPENAI_API_KEY` from the environment at
//! construction time.
//!
//! # Retry Strategy (embeddings only)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Generation is never retried: its stream is not restartable, and a
//! mid-stream failure is terminal for the request.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use docqa_core::provider::{EmbeddingProvider, GenerationProvider, TokenStream};
use docqa_core::{RagError, Result};

use crate::config::{EmbeddingConfig, GenerationConfig};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| RagError::Index("OPENAI_API_KEY environment variable not set".into()))
}

/// Embedding provider using the OpenAI `POST /v1/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Index(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key()?,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<RagError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| RagError::Index(format!("invalid response: {e}")))?;
                        return parse_embeddings_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err =
                        RagError::Index(format!("OpenAI API error {status}: {body_text}"));

                    // Rate limited or server error: retry.
                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(attempt, %status, "retrying embedding request");
                        last_err = Some(err);
                        continue;
                    }

                    // Other client errors: don't retry.
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(RagError::Index(format!("embedding request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Index("embedding failed after retries".into())))
    }
}

/// Extract the `data[].embedding` arrays, in input order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Index("invalid embeddings response: missing data".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::Index("invalid embeddings response: missing embedding".into())
            })?;
        embeddings.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

/// Generation provider using OpenAI chat completions with `stream: true`.
pub struct OpenAiGeneration {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiGeneration {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Generation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key()
                .map_err(|e| RagError::Generation(e.to_string()))?,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGeneration {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("generation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }

        // Bridge the byte stream to a delta stream through a channel;
        // dropping the receiver drops this task and the connection.
        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        tokio::spawn(async move {
            use futures_util::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(part) = bytes.next().await {
                let part = match part {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = tx
                            .send(Err(RagError::Generation(format!(
                                "stream interrupted: {e}"
                            ))))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&part));

                // SSE events are separated by a blank line.
                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data == "[DONE]" {
                            return;
                        }
                        if let Some(delta) = parse_chat_delta(data) {
                            if tx.send(Ok(delta)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Pull `choices[0].delta.content` out of one streamed chat chunk.
fn parse_chat_delta(data: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    let content = json
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

//! The ask-a-question state machine.
//!
//! One [`Orchestrator::ask`] call drives a single request through:
//! validate → embed query → retrieve → emit citations → build context →
//! stream generation → complete. Output is a lazy, ordered, finite
//! sequence of [`StreamEvent`]s consumed by a single caller.
//!
//! Guarantees, per request:
//! - validation failures return `Err` synchronously; no stream exists
//!   and no event is ever emitted for the request;
//! - every `citation` event precedes the first `token` event;
//! - `token` events are emitted in generation order and their
//!   concatenation equals the `complete` answer exactly;
//! - exactly one terminal event (`complete` or `error`) ends the
//!   stream; nothing follows it;
//! - dropping the receiver cancels the request: the worker task stops
//!   at its next send and the generation stream is dropped with it.
//!
//! Provider calls go through a bounded [`Semaphore`] owned by the
//! orchestrator, so a slow embedding or generation backend cannot
//! stall an unbounded number of requests at once.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::index::ScoredEntry;
use crate::models::{
    AskRequest, Citation, FinalResponse, StreamEvent, Usage, DEFAULT_K, MAX_K, MAX_QUESTION_LEN,
};
use crate::provider::{EmbeddingProvider, GenerationProvider};
use crate::retriever::Retriever;

/// Instruction template sent to the generation provider. Requires the
/// model to stay inside the supplied context and mark sources inline.
const PROMPT_TEMPLATE: &str = "You are a helpful AI assistant that answers questions based solely on the provided context from PDF documents.

IMPORTANT RULES:
1. Only answer using information from the provided context
2. If the answer isn't in the context, say \"I don't have enough information to answer that question.\"
3. Always include citations in your answer using the format [S1], [S2], etc. for each source
4. Be concise but thorough
5. If multiple sources contain relevant information, cite all of them
6. Do not make up information or use knowledge outside the provided context

Context:
{context}

Question: {question}

Answer:";

/// Answer returned when the user's scope contains no matching chunks.
const NO_DOCUMENTS_ANSWER: &str = "I don't have any relevant documents to answer your question. Please upload some PDF documents first.";

/// Buffer between the worker task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

pub struct Orchestrator {
    retriever: Arc<Retriever>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    provider_permits: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        max_concurrent_provider_calls: usize,
    ) -> Self {
        Self {
            retriever,
            embedder,
            generator,
            provider_permits: Arc::new(Semaphore::new(max_concurrent_provider_calls.max(1))),
        }
    }

    /// Validate and launch one ask request.
    ///
    /// Returns the event stream on success. Validation errors are
    /// returned here, before any worker task or event exists.
    pub fn ask(&self, request: AskRequest) -> Result<ReceiverStream<StreamEvent>> {
        let started = Instant::now();
        let k = validate(&request)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let worker = Worker {
            retriever: Arc::clone(&self.retriever),
            embedder: Arc::clone(&self.embedder),
            generator: Arc::clone(&self.generator),
            provider_permits: Arc::clone(&self.provider_permits),
        };

        tokio::spawn(async move {
            worker.run(request, k, started, tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Check the ask input contract and resolve `k`.
fn validate(request: &AskRequest) -> Result<usize> {
    if request.question.trim().is_empty() {
        return Err(RagError::Validation("question must not be empty".into()));
    }
    if request.question.chars().count() > MAX_QUESTION_LEN {
        return Err(RagError::Validation(format!(
            "question exceeds {MAX_QUESTION_LEN} characters"
        )));
    }
    let k = request.k.unwrap_or(DEFAULT_K);
    if k < 1 || k > MAX_K {
        return Err(RagError::Validation(format!(
            "k must be between 1 and {MAX_K}"
        )));
    }
    Ok(k)
}

struct Worker {
    retriever: Arc<Retriever>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    provider_permits: Arc<Semaphore>,
}

impl Worker {
    async fn run(
        self,
        request: AskRequest,
        k: usize,
        started: Instant,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        use futures_util::StreamExt;

        debug!(user = %request.user_id, k, "ask request started");

        // Embed the question. The permit bounds concurrent provider
        // calls across all in-flight requests.
        let query_vec = {
            let _permit = self.provider_permits.acquire().await.ok();
            match self
                .embedder
                .embed(std::slice::from_ref(&request.question))
                .await
            {
                Ok(mut vecs) if !vecs.is_empty() => vecs.remove(0),
                Ok(_) => {
                    send_error(&tx, "embedding provider returned no vector").await;
                    return;
                }
                Err(e) => {
                    send_error(&tx, &e.to_string()).await;
                    return;
                }
            }
        };

        let retrieved = match self
            .retriever
            .retrieve(&query_vec, &request.user_id, request.doc_ids.clone(), k)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                send_error(&tx, &e.to_string()).await;
                return;
            }
        };

        if retrieved.is_empty() {
            let answer = NO_DOCUMENTS_ANSWER.to_string();
            let event = StreamEvent::Complete {
                final_response: FinalResponse {
                    usage: Usage {
                        retrieved_docs: 0,
                        total_tokens: answer.split_whitespace().count(),
                    },
                    answer,
                    citations: Vec::new(),
                    latency_ms: started.elapsed().as_millis() as u64,
                },
            };
            let _ = tx.send(event).await;
            return;
        }

        // Citations go out before any token, in retrieval rank order.
        let citations: Vec<Citation> = retrieved
            .iter()
            .map(|hit| Citation::from_chunk(&hit.entry.chunk, hit.score))
            .collect();
        for citation in &citations {
            if tx
                .send(StreamEvent::Citation {
                    citation: citation.clone(),
                })
                .await
                .is_err()
            {
                return;
            }
        }

        let prompt = build_prompt(&retrieved, &request.question);

        // Hold a permit for the whole generation: the slot is the
        // worker-pool slot and is released when this task ends,
        // including on caller disconnect.
        let _permit = self.provider_permits.acquire().await.ok();
        let mut deltas = match self.generator.generate(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                send_error(&tx, &e.to_string()).await;
                return;
            }
        };

        let mut answer = String::new();
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    answer.push_str(&text);
                    if tx
                        .send(StreamEvent::Token { content: text })
                        .await
                        .is_err()
                    {
                        debug!("caller disconnected mid-stream; cancelling generation");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "generation failed mid-stream");
                    send_error(&tx, &e.to_string()).await;
                    return;
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let event = StreamEvent::Complete {
            final_response: FinalResponse {
                usage: Usage {
                    retrieved_docs: retrieved.len(),
                    total_tokens: answer.split_whitespace().count(),
                },
                answer,
                citations,
                latency_ms,
            },
        };
        let _ = tx.send(event).await;

        info!(
            user = %request.user_id,
            retrieved = retrieved.len(),
            latency_ms,
            "ask request completed"
        );
    }
}

async fn send_error(tx: &mpsc::Sender<StreamEvent>, message: &str) {
    let _ = tx
        .send(StreamEvent::Error {
            error: message.to_string(),
        })
        .await;
}

/// Concatenate retrieved chunks with source tags and render the
/// instruction template.
fn build_prompt(retrieved: &[ScoredEntry], question: &str) -> String {
    let context = retrieved
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[S{}] (Page {}): {}",
                i + 1,
                hit.entry.chunk.page,
                hit.entry.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    PROMPT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{InMemoryIndex, IndexEntry, VectorIndex};
    use crate::models::Chunk;
    use crate::retriever::RetrieverConfig;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: a 4-dim direction derived from text
    /// bytes, never zero.
    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake-embed"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| fake_vec(t)).collect())
        }
    }

    fn fake_vec(text: &str) -> Vec<f32> {
        let mut v = [1.0f32; 4];
        for (i, b) in text.bytes().enumerate() {
            v[i % 4] += (b % 13) as f32 / 13.0;
        }
        v.to_vec()
    }

    /// Generator that replays a script of deltas, optionally failing
    /// at the end, counting how many deltas were actually polled.
    struct FakeGenerator {
        deltas: Vec<String>,
        fail_after: Option<usize>,
        polled: Arc<AtomicUsize>,
    }

    impl FakeGenerator {
        fn ok(deltas: &[&str]) -> Self {
            Self {
                deltas: deltas.iter().map(|s| s.to_string()).collect(),
                fail_after: None,
                polled: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_after(deltas: &[&str], n: usize) -> Self {
            Self {
                deltas: deltas.iter().map(|s| s.to_string()).collect(),
                fail_after: Some(n),
                polled: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeGenerator {
        fn model_name(&self) -> &str {
            "fake-gen"
        }
        async fn generate(&self, _prompt: &str) -> Result<crate::provider::TokenStream> {
            let deltas = self.deltas.clone();
            let fail_after = self.fail_after;
            let polled = Arc::clone(&self.polled);
            let stream = futures_util::stream::iter(0..deltas.len() + 1).filter_map(
                move |i| {
                    let deltas = deltas.clone();
                    let polled = Arc::clone(&polled);
                    async move {
                        if let Some(n) = fail_after {
                            if i == n {
                                return Some(Err(RagError::Generation(
                                    "provider dropped the connection".into(),
                                )));
                            }
                            if i > n {
                                return None;
                            }
                        }
                        let delta = deltas.get(i).cloned()?;
                        polled.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                        Some(Ok(delta))
                    }
                },
            );
            Ok(Box::pin(stream))
        }
    }

    async fn seeded_orchestrator(generator: FakeGenerator) -> Orchestrator {
        let index = Arc::new(InMemoryIndex::new());
        let texts = [
            "Rust ownership rules prevent data races at compile time.",
            "The borrow checker enforces aliasing rules for references.",
            "Cargo builds, tests, and publishes Rust crates.",
        ];
        let entries: Vec<IndexEntry> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| IndexEntry {
                chunk: Chunk {
                    id: format!("docX_chunk_{}", i + 1),
                    doc_id: "docX".into(),
                    page: i + 1,
                    text: t.to_string(),
                    char_start: 0,
                    char_end: t.len(),
                    source: format!("page_{}", i + 1),
                },
                user_id: "u1".into(),
                vector: fake_vec(t),
            })
            .collect();
        index.add(entries).await.unwrap();

        let retriever = Arc::new(Retriever::new(index, RetrieverConfig::default()));
        Orchestrator::new(retriever, Arc::new(FakeEmbedder), Arc::new(generator), 4)
    }

    fn request(question: &str, user: &str, k: Option<usize>) -> AskRequest {
        AskRequest {
            question: question.into(),
            user_id: user.into(),
            doc_ids: None,
            k,
        }
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_events() {
        let orch = seeded_orchestrator(FakeGenerator::ok(&["hi"])).await;
        let err = orch.ask(request("   ", "u1", None)).unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_question_and_bad_k_are_rejected() {
        let orch = seeded_orchestrator(FakeGenerator::ok(&["hi"])).await;
        let long = "q".repeat(1001);
        assert!(matches!(
            orch.ask(request(&long, "u1", None)),
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            orch.ask(request("ok?", "u1", Some(0))),
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            orch.ask(request("ok?", "u1", Some(21))),
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_retrieval_yields_fallback_complete() {
        let orch = seeded_orchestrator(FakeGenerator::ok(&["unused"])).await;
        // A user with no documents retrieves nothing.
        let events: Vec<StreamEvent> = orch
            .ask(request("anything?", "nobody", None))
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Complete { final_response } => {
                assert!(final_response.citations.is_empty());
                assert_eq!(final_response.usage.retrieved_docs, 0);
                assert!(!final_response.answer.is_empty());
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn event_order_and_answer_accumulation() {
        let orch =
            seeded_orchestrator(FakeGenerator::ok(&["Owner", "ship ", "rules ", "[S1]."])).await;
        let events: Vec<StreamEvent> = orch
            .ask(request("How does ownership work?", "u1", Some(2)))
            .unwrap()
            .collect()
            .await;

        let mut saw_token = false;
        let mut tokens = String::new();
        let mut complete: Option<FinalResponse> = None;

        for (i, event) in events.iter().enumerate() {
            match event {
                StreamEvent::Citation { .. } => {
                    assert!(!saw_token, "citation after token");
                }
                StreamEvent::Token { content } => {
                    saw_token = true;
                    tokens.push_str(content);
                }
                StreamEvent::Complete { final_response } => {
                    assert_eq!(i, events.len() - 1, "complete must be last");
                    complete = Some(final_response.clone());
                }
                StreamEvent::Error { error } => panic!("unexpected error: {error}"),
            }
        }

        let final_response = complete.expect("stream must complete");
        assert_eq!(final_response.answer, tokens);
        assert_eq!(final_response.answer, "Ownership rules [S1].");
        assert!(final_response.citations.len() <= 2);
        assert_eq!(
            final_response.usage.retrieved_docs,
            final_response.citations.len()
        );
        for citation in &final_response.citations {
            assert_eq!(citation.doc_id, "docX");
            assert!(citation.excerpt.chars().count() <= 203);
            assert!(citation.score > 0.0, "true similarity is exposed");
        }
    }

    #[tokio::test]
    async fn generation_failure_emits_single_error_and_no_complete() {
        let orch = seeded_orchestrator(FakeGenerator::failing_after(&["a ", "b "], 2)).await;
        let events: Vec<StreamEvent> = orch
            .ask(request("What is cargo?", "u1", Some(1)))
            .unwrap()
            .collect()
            .await;

        let errors = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(events.last().unwrap(), StreamEvent::Error { .. }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_generation() {
        let many: Vec<String> = (0..1000).map(|i| format!("t{i} ")).collect();
        let refs: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
        let generator = FakeGenerator::ok(&refs);
        let polled = Arc::clone(&generator.polled);

        let orch = seeded_orchestrator(generator).await;
        let mut stream = orch.ask(request("cancel me", "u1", Some(1))).unwrap();

        // Consume past the citations into the token phase, then drop.
        for _ in 0..3 {
            let _ = stream.next().await;
        }
        drop(stream);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let settled = polled.load(Ordering::SeqCst);
        assert!(
            settled < 200,
            "generation kept running after the caller disconnected ({settled} deltas)"
        );
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(polled.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn prompt_contains_tagged_context_and_question() {
        let retrieved = vec![ScoredEntry {
            entry: IndexEntry {
                chunk: Chunk {
                    id: "d_chunk_1".into(),
                    doc_id: "d".into(),
                    page: 7,
                    text: "passage text".into(),
                    char_start: 0,
                    char_end: 12,
                    source: "page_7".into(),
                },
                user_id: "u".into(),
                vector: vec![1.0],
            },
            score: 0.9,
        }];
        let prompt = build_prompt(&retrieved, "why?");
        assert!(prompt.contains("[S1] (Page 7): passage text"));
        assert!(prompt.contains("Question: why?"));
        assert!(prompt.contains("I don't have enough information"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }
}

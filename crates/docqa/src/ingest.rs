//! Document ingestion: PDF bytes in, indexed chunks out.
//!
//! The pipeline records its progress on the document record so clients
//! can poll status:
//!
//! ```text
//! processing → extract pages → chunk → embed → index → ready
//!                  └──────────── any failure ────────────┴→ failed
//! ```
//!
//! Re-ingesting a document replaces its index entries wholesale: stale
//! entries are deleted before the new batch is added, so a shrunken
//! document leaves no orphans behind.

use std::sync::Arc;

use tracing::{error, info};

use docqa_core::chunker::{self, ChunkConfig};
use docqa_core::index::{IndexEntry, IndexFilter, VectorIndex};
use docqa_core::provider::EmbeddingProvider;
use docqa_core::repository::DocumentRepository;
use docqa_core::{Chunk, DocumentStatus, RagError, Result};

use crate::extract;

pub struct Ingestor {
    index: Arc<dyn VectorIndex>,
    repo: Arc<dyn DocumentRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        repo: Arc<dyn DocumentRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_config: ChunkConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            index,
            repo,
            embedder,
            chunk_config,
            batch_size: batch_size.max(1),
        }
    }

    /// Run the full pipeline for one document, recording the outcome on
    /// its repository record. Returns the chunk count on success.
    pub async fn ingest(&self, doc_id: &str, user_id: &str, bytes: Vec<u8>) -> Result<usize> {
        match self.ingest_inner(doc_id, user_id, bytes).await {
            Ok((page_count, chunk_count)) => {
                self.repo
                    .update_status(
                        doc_id,
                        DocumentStatus::Ready,
                        Some(page_count),
                        Some(chunk_count),
                        None,
                    )
                    .await?;
                info!(doc_id, page_count, chunk_count, "document ingested");
                Ok(chunk_count)
            }
            Err(e) => {
                error!(doc_id, error = %e, "ingestion failed");
                self.repo
                    .update_status(
                        doc_id,
                        DocumentStatus::Failed,
                        None,
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    async fn ingest_inner(
        &self,
        doc_id: &str,
        user_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(usize, usize)> {
        // PDF parsing is CPU-bound; keep it off the async runtime.
        let pages = tokio::task::spawn_blocking(move || extract::extract_pages(&bytes))
            .await
            .map_err(|e| RagError::Extraction(format!("extraction task failed: {e}")))??;
        let page_count = pages.len();

        let chunks = chunker::split_pages(doc_id, &pages, &self.chunk_config)?;
        let chunk_count = chunks.len();

        let entries = self.embed_chunks(user_id, chunks).await?;

        // Replace rather than merge: drop whatever a previous version of
        // this document left behind, then add the fresh entries.
        let filter = IndexFilter::for_docs(user_id, vec![doc_id.to_string()]);
        self.index.delete(&filter).await?;
        self.index.add(entries).await?;

        Ok((page_count, chunk_count))
    }

    async fn embed_chunks(&self, user_id: &str, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Index(format!(
                    "embedding count mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    user_id: user_id.to_string(),
                    vector,
                });
            }
        }

        Ok(entries)
    }

    /// Remove a document from both the index and the repository.
    pub async fn remove(&self, doc_id: &str, user_id: &str) -> Result<usize> {
        let filter = IndexFilter::for_docs(user_id, vec![doc_id.to_string()]);
        let removed = self.index.delete(&filter).await?;
        self.repo.delete(doc_id).await?;
        info!(doc_id, removed, "document removed");
        Ok(removed)
    }
}

//! Document repository abstraction.
//!
//! The ingestion pipeline records document lifecycle state through this
//! trait; the ask path never writes documents. An explicit injected
//! repository replaces the ad hoc global maps of the original system.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Document, DocumentStatus};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Create a document in `Processing` state and return it.
    async fn create(&self, user_id: &str, name: &str) -> Result<Document>;

    async fn get(&self, doc_id: &str) -> Result<Option<Document>>;

    /// All documents owned by one user, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Document>>;

    /// Record an ingestion state transition. `page_count`/`chunk_count`
    /// are set when known; `error` accompanies `Failed`.
    async fn update_status(
        &self,
        doc_id: &str,
        status: DocumentStatus,
        page_count: Option<usize>,
        chunk_count: Option<usize>,
        error: Option<String>,
    ) -> Result<()>;

    async fn delete(&self, doc_id: &str) -> Result<()>;
}

/// In-memory repository for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryRepository {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn create(&self, user_id: &str, name: &str) -> Result<Document> {
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            status: DocumentStatus::Processing,
            page_count: None,
            chunk_count: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let mut docs = self
            .docs
            .write()
            .map_err(|_| RagError::Index("repository lock poisoned".into()))?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| RagError::Index("repository lock poisoned".into()))?;
        Ok(docs.get(doc_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Document>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| RagError::Index("repository lock poisoned".into()))?;
        let mut owned: Vec<Document> = docs
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn update_status(
        &self,
        doc_id: &str,
        status: DocumentStatus,
        page_count: Option<usize>,
        chunk_count: Option<usize>,
        error: Option<String>,
    ) -> Result<()> {
        let mut docs = self
            .docs
            .write()
            .map_err(|_| RagError::Index("repository lock poisoned".into()))?;
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| RagError::Index(format!("unknown document {doc_id}")))?;
        doc.status = status;
        if page_count.is_some() {
            doc.page_count = page_count;
        }
        if chunk_count.is_some() {
            doc.chunk_count = chunk_count;
        }
        doc.error = error;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        let mut docs = self
            .docs
            .write()
            .map_err(|_| RagError::Index("repository lock poisoned".into()))?;
        docs.remove(doc_id);
        Ok(())
    }
}

//! RAG store collaborator interface
//!
//! Registration into a vector store is always auxiliary: callers record
//! failures as pending entries instead of failing the primary operation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::memory::content_checksum;

/// A document accepted by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagDocument {
    pub document_id: String,
    pub checksum: String,
}

#[async_trait]
pub trait RagStore: Send + Sync {
    /// Id of the store with this display name, created when missing
    async fn get_or_create_store(&self, name: &str) -> Result<String>;

    async fn upload(&self, store_id: &str, file_name: &str, content: &[u8]) -> Result<RagDocument>;

    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    stores: HashMap<String, String>,
    documents: HashMap<String, (String, String)>,
    failing: bool,
}

/// In-process RAG store that records uploads
#[derive(Default)]
pub struct InMemoryRagStore {
    inner: Mutex<Inner>,
}

impl InMemoryRagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload fail
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// File names uploaded into a store
    pub fn documents_in(&self, store_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .documents
            .values()
            .filter(|(store, _)| store == store_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl RagStore for InMemoryRagStore {
    async fn get_or_create_store(&self, name: &str) -> Result<String> {
        let mut inner = self.inner.lock();
        let id = inner
            .stores
            .entry(name.to_string())
            .or_insert_with(|| format!("fileSearchStores/{}", name))
            .clone();
        Ok(id)
    }

    async fn upload(&self, store_id: &str, file_name: &str, content: &[u8]) -> Result<RagDocument> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(StoreError::Backend(format!("upload of {} failed", file_name)));
        }
        let document_id = format!("{}/documents/{}", store_id, inner.documents.len() + 1);
        inner
            .documents
            .insert(document_id.clone(), (store_id.to_string(), file_name.to_string()));
        Ok(RagDocument {
            document_id,
            checksum: content_checksum(content),
        })
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.inner.lock().documents.remove(document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_reuse_and_upload() {
        let rag = InMemoryRagStore::new();
        let a = rag.get_or_create_store("notes").await.unwrap();
        let b = rag.get_or_create_store("notes").await.unwrap();
        assert_eq!(a, b);

        let doc = rag.upload(&a, "a.md", b"hello").await.unwrap();
        assert_eq!(rag.documents_in(&a), vec!["a.md"]);
        rag.delete_document(&doc.document_id).await.unwrap();
        assert!(rag.documents_in(&a).is_empty());
    }

    #[tokio::test]
    async fn test_failing_upload() {
        let rag = InMemoryRagStore::new();
        rag.set_failing(true);
        assert!(rag.upload("s", "a.md", b"x").await.is_err());
    }
}

//! Typed extension map for collaborator injection.
//!
//! The engine crate does not know the concrete file store, LLM client or
//! RAG store. Hosts put `Arc<dyn Trait>` handles into an
//! `ExecutorExtensions` under a well-known key and handlers look them up
//! by type at execution time.
//!
//! ```ignore
//! let mut ext = ExecutorExtensions::new();
//! ext.set(extension_keys::FILE_STORE, store as Arc<dyn FileStore>);
//!
//! let store = services.extensions.get::<Arc<dyn FileStore>>(extension_keys::FILE_STORE);
//! ```

use std::any::Any;
use std::collections::HashMap;

use crate::error::{NodeEngineError, Result};

/// Typed extension map holding arbitrary `Send + Sync` values
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    /// Create an empty extension map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a typed value under the given key, replacing any previous one.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Get a reference to a typed value by key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    /// Like [`get`](Self::get) but clones the value out, failing with a
    /// service error that names the missing collaborator.
    pub fn require<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Result<T> {
        self.get::<T>(key)
            .cloned()
            .ok_or_else(|| NodeEngineError::service(key, "not configured"))
    }

    /// Check whether a key exists in the map.
    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

impl Default for ExecutorExtensions {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known extension keys for standard collaborators.
pub mod extension_keys {
    /// `Arc<dyn drive_store::FileStore>`
    pub const FILE_STORE: &str = "file_store";
    /// `Arc<dyn workflow_nodes::LlmProvider>`
    pub const LLM_PROVIDER: &str = "llm_provider";
    /// `Arc<dyn drive_store::RagStore>`
    pub const RAG_STORE: &str = "rag_store";
    /// `Arc<dyn workflow_nodes::EditHistoryRecorder>`
    pub const EDIT_HISTORY: &str = "edit_history";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_trait_object_round_trip() {
        let mut ext = ExecutorExtensions::new();
        ext.set("greeter", Arc::new(English) as Arc<dyn Greeter>);

        let greeter = ext.require::<Arc<dyn Greeter>>("greeter").unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(ext.has("greeter"));
    }

    #[test]
    fn test_type_mismatch_returns_none() {
        let mut ext = ExecutorExtensions::new();
        ext.set("count", 42u32);

        assert!(ext.get::<String>("count").is_none());
        assert_eq!(ext.get::<u32>("count"), Some(&42));
    }

    #[test]
    fn test_require_missing_names_key() {
        let ext = ExecutorExtensions::new();
        let err = ext.require::<Arc<dyn Greeter>>(extension_keys::FILE_STORE).err().unwrap();
        assert_eq!(err.to_string(), "file_store error: not configured");
    }
}

//! Stage context - shared metadata and the handle handlers see

use crate::execution::node::{root_of, PipelineNode};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Key/value store shared by every stage of a pipeline
///
/// Entries survive across runs; nothing is cleared between stages or
/// between executions unless a handler does it explicitly.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of a value
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Set a value, returning the previous one
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.write().await.insert(key.into(), value.into())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().await.remove(key)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Copy of every entry
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().await.clone()
    }
}

/// What a stage handler gets to see of the pipeline running it
#[derive(Clone)]
pub struct StageContext {
    base: Arc<PathBuf>,
    metadata: Metadata,
    node: Weak<dyn PipelineNode>,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("base", &self.base)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl StageContext {
    pub(crate) fn new(base: Arc<PathBuf>, metadata: Metadata, node: Weak<dyn PipelineNode>) -> Self {
        Self {
            base,
            metadata,
            node,
        }
    }

    /// Base directory of the running pipeline
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The running pipeline, if it is still alive
    pub fn node(&self) -> Option<Arc<dyn PipelineNode>> {
        self.node.upgrade()
    }

    /// Non-owning handle to the running pipeline
    pub fn node_ref(&self) -> Weak<dyn PipelineNode> {
        self.node.clone()
    }

    /// Topmost pipeline of the composition chain
    pub fn root(&self) -> Option<Arc<dyn PipelineNode>> {
        self.node().map(root_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let metadata = Metadata::new();
        assert_eq!(metadata.insert("watch", true).await, None);
        assert_eq!(metadata.get("watch").await, Some(json!(true)));
        assert!(metadata.contains_key("watch").await);

        let previous = metadata.insert("watch", false).await;
        assert_eq!(previous, Some(json!(true)));

        metadata.remove("watch").await;
        assert_eq!(metadata.get("watch").await, None);
    }

    #[tokio::test]
    async fn test_metadata_clones_share_entries() {
        let metadata = Metadata::new();
        let other = metadata.clone();
        other.insert("title", "Home").await;
        assert_eq!(metadata.snapshot().await.len(), 1);

        metadata.clear().await;
        assert!(other.get("title").await.is_none());
    }
}

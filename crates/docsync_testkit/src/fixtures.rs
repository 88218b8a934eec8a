//! Test fixtures and store helpers.

use std::sync::Arc;

use docsync_codec::Document;
use docsync_storage::{Attachment, Capabilities, DocumentStorage, MemoryStorage};

/// Build a document from a JSON object literal.
///
/// # Panics
///
/// Panics if the JSON is not an object or holds floats.
pub fn doc(json: serde_json::Value) -> Document {
    serde_json::from_value(json).expect("Invalid test document")
}

/// A text blob attachment.
pub fn blob(text: &str) -> Attachment {
    Attachment::new(text.as_bytes().to_vec(), "text/plain")
}

/// The three stores a replicator works with.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    /// Local store.
    pub local: Arc<MemoryStorage>,
    /// Remote store.
    pub remote: Arc<MemoryStorage>,
    /// Signature store.
    pub signatures: Arc<MemoryStorage>,
}

impl ReplicaSet {
    /// Three empty stores with every capacity.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all(), Capabilities::all())
    }

    /// Local and remote stores with the given capacities.
    pub fn with_capabilities(local: Capabilities, remote: Capabilities) -> Self {
        Self {
            local: Arc::new(MemoryStorage::with_capabilities(local)),
            remote: Arc::new(MemoryStorage::with_capabilities(remote)),
            signatures: Arc::new(MemoryStorage::new()),
        }
    }

    /// Local store as a trait object.
    pub fn local_dyn(&self) -> Arc<dyn DocumentStorage> {
        self.local.clone()
    }

    /// Remote store as a trait object.
    pub fn remote_dyn(&self) -> Arc<dyn DocumentStorage> {
        self.remote.clone()
    }

    /// Signature store as a trait object.
    pub fn signatures_dyn(&self) -> Arc<dyn DocumentStorage> {
        self.signatures.clone()
    }

    /// Write the same document on both sides.
    ///
    /// # Panics
    ///
    /// Panics if a write fails.
    pub async fn put_both(&self, id: &str, document: Document) {
        self.local
            .put(id, document.clone())
            .await
            .expect("Failed to write local document");
        self.remote
            .put(id, document)
            .await
            .expect("Failed to write remote document");
    }

    /// Whether local and remote hold the same documents and attachments.
    pub fn converged(&self) -> bool {
        self.local.snapshot() == self.remote.snapshot()
    }
}

impl Default for ReplicaSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_from_json() {
        let d = doc(json!({"title": "x", "n": 2}));
        assert_eq!(d.len(), 2);
    }

    #[tokio::test]
    async fn put_both_converges() {
        let set = ReplicaSet::new();
        assert!(set.converged());
        set.put_both("a", doc(json!({"n": 1}))).await;
        assert!(set.converged());
        set.local.put("b", doc(json!({}))).await.unwrap();
        assert!(!set.converged());
    }
}

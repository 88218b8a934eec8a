//! In-memory reference backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use docsync_codec::Document;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachment::{Attachment, AttachmentInfo};
use crate::backend::DocumentStorage;
use crate::capability::{Capabilities, Capacity};
use crate::error::{StorageError, StorageResult};
use crate::query::{Query, QueryRow};

#[derive(Debug, Clone, Default)]
struct Entry {
    doc: Document,
    attachments: BTreeMap<String, Attachment>,
}

/// A thread-safe in-memory document store.
///
/// Offers every capacity by default; [`MemoryStorage::with_capabilities`]
/// builds one that behaves like a more limited backend.
///
/// # Example
///
/// ```rust
/// use docsync_codec::Document;
/// use docsync_storage::{DocumentStorage, MemoryStorage};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStorage::new();
/// store.put("a", Document::new().with("title", "x")).await.unwrap();
/// assert_eq!(store.len(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Entry>>,
    capabilities: Capabilities,
}

/// Serializable copy of a [`MemoryStorage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Documents by id.
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
    /// Attachments by document id, then by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, BTreeMap<String, Attachment>>,
}

impl MemoryStorage {
    /// Create an empty store with every capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    /// Create an empty store offering only `capabilities`.
    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capabilities,
        }
    }

    /// Create a store holding the content of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDocument`] if an attachment belongs to
    /// a document the snapshot does not contain.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> StorageResult<Self> {
        let store = Self::new();
        store.restore(snapshot)?;
        Ok(store)
    }

    /// Replace the whole content with `snapshot`.
    ///
    /// # Errors
    ///
    /// See [`MemoryStorage::from_snapshot`].
    pub fn restore(&self, snapshot: MemorySnapshot) -> StorageResult<()> {
        let MemorySnapshot {
            documents,
            mut attachments,
        } = snapshot;
        if let Some(orphan) = attachments.keys().find(|id| !documents.contains_key(*id)) {
            return Err(StorageError::InvalidDocument(format!(
                "attachments for missing document {orphan}"
            )));
        }
        let entries = documents
            .into_iter()
            .map(|(id, doc)| {
                let attachments = attachments.remove(&id).unwrap_or_default();
                (id, Entry { doc, attachments })
            })
            .collect();
        *self.entries.write() = entries;
        Ok(())
    }

    /// Copy the whole content.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        let entries = self.entries.read();
        let mut snapshot = MemorySnapshot::default();
        for (id, entry) in entries.iter() {
            snapshot.documents.insert(id.clone(), entry.doc.clone());
            if !entry.attachments.is_empty() {
                snapshot
                    .attachments
                    .insert(id.clone(), entry.attachments.clone());
            }
        }
        snapshot
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn require(&self, capacity: Capacity) -> StorageResult<()> {
        if self.capabilities.supports(capacity) {
            Ok(())
        } else {
            Err(StorageError::Unsupported(capacity))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn get(&self, id: &str) -> StorageResult<Document> {
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.doc.clone())
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn put(&self, id: &str, doc: Document) -> StorageResult<()> {
        self.entries.write().entry(id.to_string()).or_default().doc = doc;
        Ok(())
    }

    async fn post(&self, doc: Document) -> StorageResult<String> {
        self.require(Capacity::Post)?;
        let id = Uuid::new_v4().to_string();
        self.entries.write().insert(
            id.clone(),
            Entry {
                doc,
                attachments: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.entries
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        self.require(Capacity::List)?;
        if !query.filter.is_all() {
            self.require(Capacity::Filter)?;
        }
        if query.select.is_some() {
            self.require(Capacity::Select)?;
        }
        let include_docs = self.capabilities.include_docs;

        let entries = self.entries.read();
        let rows = entries
            .iter()
            .filter(|(_, entry)| query.filter.matches(&entry.doc))
            .map(|(id, entry)| {
                let value = include_docs.then(|| match &query.select {
                    Some(fields) => entry.doc.restrict(fields),
                    None => entry.doc.clone(),
                });
                QueryRow {
                    id: id.clone(),
                    value,
                }
            })
            .collect();
        Ok(rows)
    }

    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>> {
        let with_digest = self.capabilities.attachment_digest;
        let entries = self.entries.read();
        let entry = entries.get(id).ok_or_else(|| StorageError::not_found(id))?;
        Ok(entry
            .attachments
            .iter()
            .map(|(name, attachment)| (name.clone(), attachment.info(with_digest)))
            .collect())
    }

    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.entries
            .read()
            .get(id)
            .and_then(|entry| entry.attachments.get(name).cloned())
            .ok_or_else(|| StorageError::attachment_not_found(id, name))
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        attachment: Attachment,
    ) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        entry.attachments.insert(name.to_string(), attachment);
        Ok(())
    }

    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.entries
            .write()
            .get_mut(id)
            .and_then(|entry| entry.attachments.remove(name))
            .map(|_| ())
            .ok_or_else(|| StorageError::attachment_not_found(id, name))
    }
}

//! JSON-file snapshot stores.
//!
//! A snapshot store is a [`MemoryStorage`] loaded from a JSON file when it is
//! built and written back with [`SnapshotStorage::save`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docsync_codec::Document;
use docsync_storage::{
    Attachment, AttachmentInfo, Capabilities, DocumentStorage, MemorySnapshot, MemoryStorage,
    Query, QueryRow, StorageDescription, StorageError, StorageRegistry, StorageResult,
};
use parking_lot::Mutex;
use tracing::debug;

/// Registered type name.
pub const SNAPSHOT_TYPE: &str = "snapshot";

/// A memory store backed by a JSON file.
#[derive(Debug)]
pub struct SnapshotStorage {
    path: PathBuf,
    inner: MemoryStorage,
}

impl SnapshotStorage {
    /// Load `path`, or start empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let snapshot: MemorySnapshot = serde_json::from_str(&text).map_err(|e| {
                StorageError::InvalidDocument(format!("{}: {e}", path.display()))
            })?;
            MemoryStorage::from_snapshot(snapshot)?
        } else {
            MemoryStorage::new()
        };
        debug!(path = %path.display(), documents = inner.len(), "snapshot loaded");
        Ok(Self { path, inner })
    }

    /// Write the current content back to the file.
    pub fn save(&self) -> StorageResult<()> {
        let text = serde_json::to_string_pretty(&self.inner.snapshot())
            .map_err(|e| StorageError::backend(e.to_string()))?;
        fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), documents = self.inner.len(), "snapshot saved");
        Ok(())
    }
}

#[async_trait]
impl DocumentStorage for SnapshotStorage {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn get(&self, id: &str) -> StorageResult<Document> {
        self.inner.get(id).await
    }

    async fn put(&self, id: &str, doc: Document) -> StorageResult<()> {
        self.inner.put(id, doc).await
    }

    async fn post(&self, doc: Document) -> StorageResult<String> {
        self.inner.post(doc).await
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.inner.remove(id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        self.inner.query(query).await
    }

    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>> {
        self.inner.all_attachments(id).await
    }

    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.inner.get_attachment(id, name).await
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        attachment: Attachment,
    ) -> StorageResult<()> {
        self.inner.put_attachment(id, name, attachment).await
    }

    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.inner.remove_attachment(id, name).await
    }
}

/// Snapshot stores opened through a registry, saved together at the end of
/// a run.
#[derive(Debug, Clone, Default)]
pub struct OpenSnapshots {
    stores: Arc<Mutex<Vec<Arc<SnapshotStorage>>>>,
}

impl OpenSnapshots {
    /// Register the `snapshot` type on `registry`. Relative paths are
    /// resolved against `base`.
    pub fn register(&self, registry: &mut StorageRegistry, base: &Path) {
        let stores = self.stores.clone();
        let base = base.to_path_buf();
        registry.register(SNAPSHOT_TYPE, move |description: &StorageDescription| {
            let path = base.join(description.str_param("path")?);
            let store = Arc::new(SnapshotStorage::open(path)?);
            stores.lock().push(store.clone());
            Ok(store as Arc<dyn DocumentStorage>)
        });
    }

    /// Number of stores opened so far.
    pub fn count(&self) -> usize {
        self.stores.lock().len()
    }

    /// Save every opened store.
    pub fn save_all(&self) -> StorageResult<()> {
        let stores = self.stores.lock().clone();
        for store in stores {
            store.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_survives_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = SnapshotStorage::open(&path).unwrap();
        store
            .put("a", Document::new().with("title", "hello"))
            .await
            .unwrap();
        store
            .put_attachment("a", "note", Attachment::new("hi", "text/plain"))
            .await
            .unwrap();
        store.save().unwrap();

        let reopened = SnapshotStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("a").await.unwrap(),
            Document::new().with("title", "hello")
        );
        assert_eq!(
            reopened.get_attachment("a", "note").await.unwrap(),
            Attachment::new("hi", "text/plain")
        );
    }

    #[test]
    fn malformed_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SnapshotStorage::open(&path),
            Err(StorageError::InvalidDocument(_))
        ));
    }

    #[test]
    fn registry_paths_are_relative_to_the_base() {
        let dir = tempfile::tempdir().unwrap();
        let opened = OpenSnapshots::default();
        let mut registry = StorageRegistry::with_builtin();
        opened.register(&mut registry, dir.path());

        registry
            .create(&StorageDescription::new(SNAPSHOT_TYPE).with_param("path", "local.json"))
            .unwrap();
        assert_eq!(opened.count(), 1);
        opened.save_all().unwrap();
        assert!(dir.path().join("local.json").exists());

        assert!(registry
            .create(&StorageDescription::new(SNAPSHOT_TYPE))
            .is_err());
    }
}

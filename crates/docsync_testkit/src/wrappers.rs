//! Storage wrappers for observing and disturbing a replicator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docsync_codec::Document;
use docsync_storage::{
    Attachment, AttachmentInfo, Capabilities, DocumentStorage, Query, QueryRow, StorageError,
    StorageResult,
};
use parking_lot::Mutex;

/// In-flight and peak counts for one class of operations.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }

    /// Highest number of operations seen in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Operations started so far.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

struct GaugeGuard<'a> {
    gauge: &'a ConcurrencyGauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts concurrent operations, optionally slowing each one down, and
/// records every write in order.
pub struct InstrumentedStorage {
    inner: Arc<dyn DocumentStorage>,
    delay: Duration,
    documents: ConcurrencyGauge,
    attachments: ConcurrencyGauge,
    writes: Mutex<Vec<String>>,
}

impl InstrumentedStorage {
    /// Wrap `inner` without delay.
    pub fn new(inner: Arc<dyn DocumentStorage>) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            documents: ConcurrencyGauge::default(),
            attachments: ConcurrencyGauge::default(),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every operation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Document operation counters.
    pub fn documents(&self) -> &ConcurrencyGauge {
        &self.documents
    }

    /// Attachment operation counters.
    pub fn attachments(&self) -> &ConcurrencyGauge {
        &self.attachments
    }

    /// Writes seen so far, as `"put id"`, `"remove id"`,
    /// `"put_attachment id/name"` and so on.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    fn record(&self, op: &str, target: &str) {
        self.writes.lock().push(format!("{op} {target}"));
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl DocumentStorage for InstrumentedStorage {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn get(&self, id: &str) -> StorageResult<Document> {
        let _guard = self.documents.enter();
        self.pause().await;
        self.inner.get(id).await
    }

    async fn put(&self, id: &str, doc: Document) -> StorageResult<()> {
        let _guard = self.documents.enter();
        self.pause().await;
        self.record("put", id);
        self.inner.put(id, doc).await
    }

    async fn post(&self, doc: Document) -> StorageResult<String> {
        let _guard = self.documents.enter();
        self.pause().await;
        let id = self.inner.post(doc).await?;
        self.record("post", &id);
        Ok(id)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        let _guard = self.documents.enter();
        self.pause().await;
        self.record("remove", id);
        self.inner.remove(id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        let _guard = self.documents.enter();
        self.pause().await;
        self.inner.query(query).await
    }

    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>> {
        let _guard = self.attachments.enter();
        self.pause().await;
        self.inner.all_attachments(id).await
    }

    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        let _guard = self.attachments.enter();
        self.pause().await;
        self.inner.get_attachment(id, name).await
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        attachment: Attachment,
    ) -> StorageResult<()> {
        let _guard = self.attachments.enter();
        self.pause().await;
        self.record("put_attachment", &format!("{id}/{name}"));
        self.inner.put_attachment(id, name, attachment).await
    }

    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        let _guard = self.attachments.enter();
        self.pause().await;
        self.record("remove_attachment", &format!("{id}/{name}"));
        self.inner.remove_attachment(id, name).await
    }

    async fn repair(&self) -> StorageResult<()> {
        self.inner.repair().await
    }
}

/// Injects failures for chosen ids.
pub struct FaultyStorage {
    inner: Arc<dyn DocumentStorage>,
    conflicts: Mutex<HashMap<String, usize>>,
    broken: Mutex<HashSet<String>>,
    broken_attachments: Mutex<HashSet<(String, String)>>,
    repair_fails: bool,
}

impl FaultyStorage {
    /// Wrap `inner`; nothing fails until configured.
    pub fn new(inner: Arc<dyn DocumentStorage>) -> Self {
        Self {
            inner,
            conflicts: Mutex::new(HashMap::new()),
            broken: Mutex::new(HashSet::new()),
            broken_attachments: Mutex::new(HashSet::new()),
            repair_fails: false,
        }
    }

    /// The next `times` writes of `id` fail with an update conflict.
    pub fn conflict_on(&self, id: &str, times: usize) {
        self.conflicts.lock().insert(id.to_string(), times);
    }

    /// Every operation on `id` fails with a backend error.
    pub fn break_document(&self, id: &str) {
        self.broken.lock().insert(id.to_string());
    }

    /// Every operation on one attachment fails with a backend error.
    pub fn break_attachment(&self, id: &str, name: &str) {
        self.broken_attachments
            .lock()
            .insert((id.to_string(), name.to_string()));
    }

    /// `repair` fails.
    #[must_use]
    pub fn with_failing_repair(mut self) -> Self {
        self.repair_fails = true;
        self
    }

    fn check(&self, id: &str) -> StorageResult<()> {
        if self.broken.lock().contains(id) {
            return Err(StorageError::backend(format!("injected failure on {id}")));
        }
        Ok(())
    }

    fn check_write(&self, id: &str) -> StorageResult<()> {
        self.check(id)?;
        let mut conflicts = self.conflicts.lock();
        if let Some(left) = conflicts.get_mut(id) {
            if *left > 0 {
                *left -= 1;
                return Err(StorageError::update_conflict(id));
            }
        }
        Ok(())
    }

    fn check_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.check(id)?;
        if self
            .broken_attachments
            .lock()
            .contains(&(id.to_string(), name.to_string()))
        {
            return Err(StorageError::backend(format!(
                "injected failure on {id}/{name}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStorage for FaultyStorage {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn get(&self, id: &str) -> StorageResult<Document> {
        self.check(id)?;
        self.inner.get(id).await
    }

    async fn put(&self, id: &str, doc: Document) -> StorageResult<()> {
        self.check_write(id)?;
        self.inner.put(id, doc).await
    }

    async fn post(&self, doc: Document) -> StorageResult<String> {
        self.inner.post(doc).await
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.check_write(id)?;
        self.inner.remove(id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        self.inner.query(query).await
    }

    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>> {
        self.check(id)?;
        self.inner.all_attachments(id).await
    }

    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.check_attachment(id, name)?;
        self.inner.get_attachment(id, name).await
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        attachment: Attachment,
    ) -> StorageResult<()> {
        self.check_attachment(id, name)?;
        self.inner.put_attachment(id, name, attachment).await
    }

    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.check_attachment(id, name)?;
        self.inner.remove_attachment(id, name).await
    }

    async fn repair(&self) -> StorageResult<()> {
        if self.repair_fails {
            return Err(StorageError::backend("injected repair failure"));
        }
        self.inner.repair().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_storage::MemoryStorage;

    #[tokio::test]
    async fn gauge_tracks_peak_concurrency() {
        let store = Arc::new(
            InstrumentedStorage::new(Arc::new(MemoryStorage::new()))
                .with_delay(Duration::from_millis(5)),
        );
        let a = store.put("a", Document::new());
        let b = store.put("b", Document::new());
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();
        assert_eq!(store.documents().peak(), 2);
        assert_eq!(store.documents().total(), 2);
        assert_eq!(store.attachments().total(), 0);
        let mut writes = store.writes();
        writes.sort();
        assert_eq!(writes, vec!["put a", "put b"]);
    }

    #[tokio::test]
    async fn conflicts_are_injected_a_limited_number_of_times() {
        let store = FaultyStorage::new(Arc::new(MemoryStorage::new()));
        store.conflict_on("a", 1);
        let err = store.put("a", Document::new()).await.unwrap_err();
        assert!(err.is_conflict());
        store.put("a", Document::new()).await.unwrap();
    }

    #[tokio::test]
    async fn broken_documents_always_fail() {
        let store = FaultyStorage::new(Arc::new(MemoryStorage::new()));
        store.break_document("a");
        assert!(store.get("a").await.is_err());
        assert!(store.put("a", Document::new()).await.is_err());
        store.put("b", Document::new()).await.unwrap();
    }
}

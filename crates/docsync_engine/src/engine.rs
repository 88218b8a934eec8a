//! The replicator: a document store kept convergent with a remote one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use docsync_codec::Document;
use docsync_storage::{
    Attachment, AttachmentInfo, Capabilities, DocumentStorage, Query, QueryRow, StorageError,
    StorageResult,
};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::ReplicateOptions;
use crate::error::{RepairFailure, ReplicateError, ReplicateResult, Store};
use crate::executor::OperationPool;
use crate::hasher::Hasher;
use crate::reconcile::Pass;
use crate::report::Report;
use crate::scanner::Scanner;
use crate::signature::SignatureStore;

/// Where the replicator is in its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    /// No pass has run yet, or the last one finished.
    Idle,
    /// Repairing the wrapped stores.
    RepairingSubstores,
    /// Listing and hashing both sides.
    Scanning,
    /// Applying decisions.
    Reconciling,
    /// Last pass finished with a clean report.
    Done,
    /// Last pass failed or left conflicts behind.
    Failed,
}

impl RepairState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RepairState::RepairingSubstores | RepairState::Scanning | RepairState::Reconciling
        )
    }
}

/// Counters across passes.
#[derive(Debug, Clone, Default)]
pub struct RepairStats {
    /// Passes started.
    pub passes: u64,
    /// Passes that returned a clean report.
    pub clean_passes: u64,
    /// Candidates examined by the last pass.
    pub last_candidates: usize,
    /// Error entries of the last pass.
    pub last_failures: usize,
    /// Duration of the last pass.
    pub last_duration: Option<Duration>,
    /// Last whole-pass error message.
    pub last_error: Option<String>,
}

/// Keeps a local and a remote store convergent.
///
/// Reads and writes through the [`DocumentStorage`] implementation go to the
/// local store; [`Replicator::repair`] reconciles it with the remote one.
/// Replicators can wrap other replicators: a pass first repairs both wrapped
/// stores.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use docsync_codec::Document;
/// use docsync_engine::{ReplicateOptions, Replicator};
/// use docsync_storage::{DocumentStorage, MemoryStorage};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let local = Arc::new(MemoryStorage::new());
/// let remote = Arc::new(MemoryStorage::new());
/// let replicator = Replicator::new(
///     local.clone(),
///     remote.clone(),
///     Arc::new(MemoryStorage::new()),
///     ReplicateOptions::default(),
/// )
/// .unwrap();
///
/// replicator.put("a", Document::new().with("n", 1)).await.unwrap();
/// replicator.repair().await.unwrap();
/// assert!(remote.get("a").await.is_ok());
/// # }
/// ```
pub struct Replicator {
    local: Arc<dyn DocumentStorage>,
    remote: Arc<dyn DocumentStorage>,
    signatures: SignatureStore,
    options: ReplicateOptions,
    state: RwLock<RepairState>,
    stats: RwLock<RepairStats>,
    cancelled: Arc<AtomicBool>,
    pools: Mutex<Option<(OperationPool, OperationPool)>>,
}

impl Replicator {
    /// Create a replicator over three stores.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicateError::InvalidOptions`] if the options are
    /// inconsistent.
    pub fn new(
        local: Arc<dyn DocumentStorage>,
        remote: Arc<dyn DocumentStorage>,
        signature_storage: Arc<dyn DocumentStorage>,
        options: ReplicateOptions,
    ) -> ReplicateResult<Self> {
        options.validate()?;
        Ok(Self {
            local,
            remote,
            signatures: SignatureStore::new(signature_storage),
            options,
            state: RwLock::new(RepairState::Idle),
            stats: RwLock::new(RepairStats::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            pools: Mutex::new(None),
        })
    }

    /// Options in use.
    pub fn options(&self) -> &ReplicateOptions {
        &self.options
    }

    /// Gets the current state.
    pub fn state(&self) -> RepairState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> RepairStats {
        self.stats.read().clone()
    }

    /// Stop the running pass. Operations already admitted finish; nothing
    /// is undone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some((documents, attachments)) = self.pools.lock().as_ref() {
            documents.close();
            attachments.close();
        }
    }

    fn set_state(&self, state: RepairState) {
        *self.state.write() = state;
    }

    /// Run one repair pass.
    ///
    /// # Errors
    ///
    /// - [`ReplicateError::Unresolved`] when the report holds error entries
    ///   (conflicts left to a human, failed documents); every action taken
    ///   is still in the carried report
    /// - [`ReplicateError::SubstoreRepair`] or [`ReplicateError::Scan`] when
    ///   the pass could not start reconciling
    /// - [`ReplicateError::Cancelled`] after [`Replicator::cancel`]
    /// - [`ReplicateError::AlreadyRunning`] when another pass is in progress
    pub async fn repair(&self) -> ReplicateResult<Report> {
        let start = Instant::now();
        let pass = self.begin()?;
        let _guard = PassGuard { replicator: self };

        let result = self.run_pass(&pass).await;

        let elapsed = start.elapsed();
        let mut stats = self.stats.write();
        stats.passes += 1;
        stats.last_duration = Some(elapsed);
        match &result {
            Ok(report) => {
                stats.clean_passes += 1;
                stats.last_failures = 0;
                stats.last_error = None;
                info!(entries = report.len(), ?elapsed, "repair finished");
                self.set_state(RepairState::Done);
            }
            Err(e) => {
                stats.last_failures = e.report().map_or(0, |r| r.failures().len());
                stats.last_error = Some(e.to_string());
                warn!(error = %e, ?elapsed, "repair failed");
                self.set_state(RepairState::Failed);
            }
        }
        result
    }

    fn begin(&self) -> ReplicateResult<Pass> {
        let mut pools = self.pools.lock();
        if pools.is_some() {
            return Err(ReplicateError::AlreadyRunning);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        let documents = OperationPool::new(
            "documents",
            self.options.parallel_operation_amount,
            self.cancelled.clone(),
        );
        let attachments = OperationPool::new(
            "attachments",
            self.options.parallel_operation_attachment_amount,
            self.cancelled.clone(),
        );
        *pools = Some((documents.clone(), attachments.clone()));
        Ok(Pass {
            local: self.local.clone(),
            remote: self.remote.clone(),
            signatures: self.signatures.clone(),
            options: self.options.clone(),
            hasher: Hasher::new(self.options.signature_hash_key.clone()),
            documents,
            attachments,
        })
    }

    async fn run_pass(&self, pass: &Pass) -> ReplicateResult<Report> {
        info!(
            policy = ?self.options.conflict_handling,
            documents = pass.documents.limit(),
            attachments = pass.attachments.limit(),
            "repair started"
        );

        self.set_state(RepairState::RepairingSubstores);
        for (store, storage) in [(Store::Local, &self.local), (Store::Remote, &self.remote)] {
            storage
                .repair()
                .await
                .map_err(|source| ReplicateError::SubstoreRepair { store, source })?;
        }
        self.check_cancelled()?;

        self.set_state(RepairState::Scanning);
        let candidates = Scanner {
            local: &pass.local,
            remote: &pass.remote,
            signatures: &pass.signatures,
            hasher: &pass.hasher,
            filter: &pass.options.query,
            pool: &pass.documents,
        }
        .scan()
        .await?;
        self.stats.write().last_candidates = candidates.len();
        self.check_cancelled()?;

        self.set_state(RepairState::Reconciling);
        let logs = pass
            .documents
            .run_all(candidates, |candidate| pass.reconcile(candidate))
            .await?;

        let mut report = Report::new(self.options.report_level);
        report.extend(logs.into_iter().flatten());
        if report.has_failures() {
            return Err(ReplicateError::Unresolved(Box::new(RepairFailure::new(
                report,
            ))));
        }
        Ok(report)
    }

    fn check_cancelled(&self) -> ReplicateResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ReplicateError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Releases the pass slot however the pass ends.
struct PassGuard<'a> {
    replicator: &'a Replicator,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.replicator.pools.lock().take();
        if self.replicator.state().is_active() {
            self.replicator.set_state(RepairState::Failed);
        }
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn replicate_to_storage(err: ReplicateError) -> StorageError {
    match err {
        ReplicateError::Storage(e) => e,
        other => StorageError::backend(other.to_string()),
    }
}

#[async_trait]
impl DocumentStorage for Replicator {
    fn capabilities(&self) -> Capabilities {
        self.local.capabilities()
    }

    async fn get(&self, id: &str) -> StorageResult<Document> {
        self.local.get(id).await
    }

    async fn put(&self, id: &str, doc: Document) -> StorageResult<()> {
        self.local.put(id, doc).await
    }

    async fn post(&self, doc: Document) -> StorageResult<String> {
        self.local.post(doc).await
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.local.remove(id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>> {
        self.local.query(query).await
    }

    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>> {
        self.local.all_attachments(id).await
    }

    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.local.get_attachment(id, name).await
    }

    async fn put_attachment(
        &self,
        id: &str,
        name: &str,
        attachment: Attachment,
    ) -> StorageResult<()> {
        self.local.put_attachment(id, name, attachment).await
    }

    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.local.remove_attachment(id, name).await
    }

    async fn repair(&self) -> StorageResult<()> {
        Replicator::repair(self)
            .await
            .map(|_| ())
            .map_err(replicate_to_storage)
    }
}

//! Error types for replication.

use std::fmt;

use docsync_codec::CodecError;
use docsync_storage::StorageError;
use thiserror::Error;

use crate::report::{Report, ReportEntry};

/// Result type for replication operations.
pub type ReplicateResult<T> = Result<T, ReplicateError>;

/// One of the three stores a replicator works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    /// The local store.
    Local,
    /// The remote store.
    Remote,
    /// The signature store.
    Signature,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Store::Local => "local",
            Store::Remote => "remote",
            Store::Signature => "signature",
        })
    }
}

/// A pass that finished with error entries in its report.
///
/// Nothing is rolled back; the report describes every action taken.
#[derive(Debug, Clone)]
pub struct RepairFailure {
    report: Report,
}

impl RepairFailure {
    /// Wrap a report holding at least one error entry.
    pub fn new(report: Report) -> Self {
        Self { report }
    }

    /// The full report of the pass.
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Unresolved or failed entries.
    pub fn failures(&self) -> &[ReportEntry] {
        self.report.failures()
    }

    /// Take the report back.
    pub fn into_report(self) -> Report {
        self.report
    }
}

/// Errors that fail a whole repair call.
///
/// Per-document failures never surface here directly: they are logged in the
/// report and collected into [`ReplicateError::Unresolved`].
#[derive(Debug, Error)]
pub enum ReplicateError {
    /// Options rejected at construction.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A store could not be listed.
    #[error("cannot scan {store} storage: {source}")]
    Scan {
        /// Store being listed.
        store: Store,
        /// Underlying failure.
        source: StorageError,
    },

    /// Repairing a sub-store failed before reconciliation started.
    #[error("cannot repair {store} storage: {source}")]
    SubstoreRepair {
        /// Store being repaired.
        store: Store,
        /// Underlying failure.
        source: StorageError,
    },

    /// A document was posted but moving it to its new id did not complete.
    ///
    /// Never retried within the pass: retrying would post it again.
    #[error("re-parenting {id} to {new_id} did not complete: {source}")]
    Reparent {
        /// Id the document was posted from.
        id: String,
        /// Id the remote store assigned.
        new_id: String,
        /// Underlying failure.
        source: Box<ReplicateError>,
    },

    /// The pass completed but left conflicts or failures behind.
    #[error("repair finished with {} unresolved entries", .0.failures().len())]
    Unresolved(Box<RepairFailure>),

    /// The pass was cancelled.
    #[error("repair cancelled")]
    Cancelled,

    /// Another repair is running on this replicator.
    #[error("a repair is already running")]
    AlreadyRunning,

    /// Storage failure outside any per-document step.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ReplicateError {
    /// Create an invalid options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions(message.into())
    }

    /// The report of a pass that finished with failures.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Unresolved(failure) => Some(failure.report()),
            _ => None,
        }
    }

    /// Whether the pass stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether a storage error is worth retrying after re-reading both sides.
    pub(crate) fn is_stale(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_conflict() || e.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportCode, Severity};

    #[test]
    fn unresolved_counts_failures() {
        let mut report = Report::new(Severity::Info);
        report.log(ReportEntry::document(ReportCode::UnresolvedConflict, "a"));
        report.log(ReportEntry::document(ReportCode::NoChange, "b"));
        let err = ReplicateError::Unresolved(Box::new(RepairFailure::new(report)));
        assert_eq!(err.to_string(), "repair finished with 1 unresolved entries");
        assert_eq!(err.report().map(Report::len), Some(2));
    }

    #[test]
    fn scan_error_names_the_store() {
        let err = ReplicateError::Scan {
            store: Store::Remote,
            source: StorageError::backend("offline"),
        };
        assert_eq!(
            err.to_string(),
            "cannot scan remote storage: backend error: offline"
        );
    }

    #[test]
    fn interrupted_reparenting_is_not_stale() {
        let err = ReplicateError::Reparent {
            id: "tmp".into(),
            new_id: "n1".into(),
            source: Box::new(StorageError::update_conflict("tmp").into()),
        };
        assert!(!err.is_stale());
        assert!(err.to_string().starts_with("re-parenting tmp to n1 did not complete"));
    }

    #[test]
    fn stale_errors() {
        assert!(ReplicateError::from(StorageError::update_conflict("a")).is_stale());
        assert!(ReplicateError::from(StorageError::not_found("a")).is_stale());
        assert!(!ReplicateError::from(StorageError::backend("x")).is_stale());
        assert!(!ReplicateError::Cancelled.is_stale());
        assert!(ReplicateError::Cancelled.is_cancelled());
    }
}

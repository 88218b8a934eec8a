//! Options for a replicator.

use docsync_storage::Filter;
use serde::{Deserialize, Serialize};

use crate::conflict::{ChangeKind, ConflictPolicy, Side};
use crate::error::{ReplicateError, ReplicateResult};
use crate::report::{Scope, Severity};

/// Options controlling a repair pass.
///
/// Every field has a default, so a configuration file only needs to name
/// what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReplicateOptions {
    /// How true conflicts are settled (codes 0 to 3).
    pub conflict_handling: ConflictPolicy,

    /// Propagate documents created locally.
    pub check_local_creation: bool,
    /// Propagate documents modified locally.
    pub check_local_modification: bool,
    /// Propagate documents deleted locally.
    pub check_local_deletion: bool,
    /// Propagate documents created remotely.
    pub check_remote_creation: bool,
    /// Propagate documents modified remotely.
    pub check_remote_modification: bool,
    /// Propagate documents deleted remotely.
    pub check_remote_deletion: bool,

    /// Propagate attachments created locally.
    pub check_local_attachment_creation: bool,
    /// Propagate attachments modified locally.
    pub check_local_attachment_modification: bool,
    /// Propagate attachments deleted locally.
    pub check_local_attachment_deletion: bool,
    /// Propagate attachments created remotely.
    pub check_remote_attachment_creation: bool,
    /// Propagate attachments modified remotely.
    pub check_remote_attachment_modification: bool,
    /// Propagate attachments deleted remotely.
    pub check_remote_attachment_deletion: bool,

    /// Trust digests reported by attachment listings instead of downloading.
    pub use_attachment_digest: bool,

    /// Restrict document hashes to these fields.
    pub signature_hash_key: Option<Vec<String>>,

    /// Create local documents remotely with `post` and adopt the new id.
    pub use_remote_post: bool,

    /// Maximum document operations in flight.
    pub parallel_operation_amount: usize,

    /// Maximum attachment operations in flight.
    pub parallel_operation_attachment_amount: usize,

    /// Documents taking part in replication.
    pub query: Filter,

    /// Least severe report entries to keep.
    pub report_level: Severity,
}

impl ReplicateOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the conflict policy.
    pub fn with_conflict_handling(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_handling = policy;
        self
    }

    /// Enables or disables one document check.
    pub fn with_check(mut self, side: Side, kind: ChangeKind, enabled: bool) -> Self {
        *self.toggle_mut(Scope::Document, side, kind) = enabled;
        self
    }

    /// Enables or disables one attachment check.
    pub fn with_attachment_check(mut self, side: Side, kind: ChangeKind, enabled: bool) -> Self {
        *self.toggle_mut(Scope::Attachment, side, kind) = enabled;
        self
    }

    /// Enables all six attachment checks.
    pub fn with_all_attachment_checks(mut self) -> Self {
        for side in [Side::Local, Side::Remote] {
            for kind in [
                ChangeKind::Creation,
                ChangeKind::Modification,
                ChangeKind::Deletion,
            ] {
                *self.toggle_mut(Scope::Attachment, side, kind) = true;
            }
        }
        self
    }

    /// Sets whether listing digests are trusted.
    pub fn with_attachment_digest(mut self, enabled: bool) -> Self {
        self.use_attachment_digest = enabled;
        self
    }

    /// Restricts document hashes to `fields`.
    pub fn with_signature_hash_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature_hash_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets whether remote creations use `post`.
    pub fn with_remote_post(mut self, enabled: bool) -> Self {
        self.use_remote_post = enabled;
        self
    }

    /// Sets the document pool size.
    pub fn with_parallel_operations(mut self, amount: usize) -> Self {
        self.parallel_operation_amount = amount;
        self
    }

    /// Sets the attachment pool size.
    pub fn with_parallel_attachment_operations(mut self, amount: usize) -> Self {
        self.parallel_operation_attachment_amount = amount;
        self
    }

    /// Sets the replication filter.
    pub fn with_query(mut self, filter: Filter) -> Self {
        self.query = filter;
        self
    }

    /// Sets the report level.
    pub fn with_report_level(mut self, level: Severity) -> Self {
        self.report_level = level;
        self
    }

    /// Check option consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicateError::InvalidOptions`] for empty pools or an
    /// empty hash key list.
    pub fn validate(&self) -> ReplicateResult<()> {
        if self.parallel_operation_amount == 0 {
            return Err(ReplicateError::invalid_options(
                "parallel_operation_amount must be at least 1",
            ));
        }
        if self.parallel_operation_attachment_amount == 0 {
            return Err(ReplicateError::invalid_options(
                "parallel_operation_attachment_amount must be at least 1",
            ));
        }
        if matches!(&self.signature_hash_key, Some(keys) if keys.is_empty()) {
            return Err(ReplicateError::invalid_options(
                "signature_hash_key must name at least one field",
            ));
        }
        Ok(())
    }

    /// Whether the check for `kind` changes on `side` is enabled.
    pub fn allows(&self, scope: Scope, side: Side, kind: ChangeKind) -> bool {
        match (scope, side, kind) {
            (Scope::Document, Side::Local, ChangeKind::Creation) => self.check_local_creation,
            (Scope::Document, Side::Local, ChangeKind::Modification) => {
                self.check_local_modification
            }
            (Scope::Document, Side::Local, ChangeKind::Deletion) => self.check_local_deletion,
            (Scope::Document, Side::Remote, ChangeKind::Creation) => self.check_remote_creation,
            (Scope::Document, Side::Remote, ChangeKind::Modification) => {
                self.check_remote_modification
            }
            (Scope::Document, Side::Remote, ChangeKind::Deletion) => self.check_remote_deletion,
            (Scope::Attachment, Side::Local, ChangeKind::Creation) => {
                self.check_local_attachment_creation
            }
            (Scope::Attachment, Side::Local, ChangeKind::Modification) => {
                self.check_local_attachment_modification
            }
            (Scope::Attachment, Side::Local, ChangeKind::Deletion) => {
                self.check_local_attachment_deletion
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Creation) => {
                self.check_remote_attachment_creation
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Modification) => {
                self.check_remote_attachment_modification
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Deletion) => {
                self.check_remote_attachment_deletion
            }
        }
    }

    /// Whether attachments take part in replication at all.
    pub fn reconciles_attachments(&self) -> bool {
        self.check_local_attachment_creation
            || self.check_local_attachment_modification
            || self.check_local_attachment_deletion
            || self.check_remote_attachment_creation
            || self.check_remote_attachment_modification
            || self.check_remote_attachment_deletion
    }

    fn toggle_mut(&mut self, scope: Scope, side: Side, kind: ChangeKind) -> &mut bool {
        match (scope, side, kind) {
            (Scope::Document, Side::Local, ChangeKind::Creation) => &mut self.check_local_creation,
            (Scope::Document, Side::Local, ChangeKind::Modification) => {
                &mut self.check_local_modification
            }
            (Scope::Document, Side::Local, ChangeKind::Deletion) => &mut self.check_local_deletion,
            (Scope::Document, Side::Remote, ChangeKind::Creation) => {
                &mut self.check_remote_creation
            }
            (Scope::Document, Side::Remote, ChangeKind::Modification) => {
                &mut self.check_remote_modification
            }
            (Scope::Document, Side::Remote, ChangeKind::Deletion) => {
                &mut self.check_remote_deletion
            }
            (Scope::Attachment, Side::Local, ChangeKind::Creation) => {
                &mut self.check_local_attachment_creation
            }
            (Scope::Attachment, Side::Local, ChangeKind::Modification) => {
                &mut self.check_local_attachment_modification
            }
            (Scope::Attachment, Side::Local, ChangeKind::Deletion) => {
                &mut self.check_local_attachment_deletion
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Creation) => {
                &mut self.check_remote_attachment_creation
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Modification) => {
                &mut self.check_remote_attachment_modification
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Deletion) => {
                &mut self.check_remote_attachment_deletion
            }
        }
    }
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self {
            conflict_handling: ConflictPolicy::Unresolved,
            check_local_creation: true,
            check_local_modification: true,
            check_local_deletion: true,
            check_remote_creation: true,
            check_remote_modification: true,
            check_remote_deletion: true,
            check_local_attachment_creation: false,
            check_local_attachment_modification: false,
            check_local_attachment_deletion: false,
            check_remote_attachment_creation: false,
            check_remote_attachment_modification: false,
            check_remote_attachment_deletion: false,
            use_attachment_digest: true,
            signature_hash_key: None,
            use_remote_post: false,
            parallel_operation_amount: 1,
            parallel_operation_attachment_amount: 1,
            query: Filter::All,
            report_level: Severity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ReplicateOptions::default();
        assert_eq!(options.conflict_handling, ConflictPolicy::Unresolved);
        assert!(options.allows(Scope::Document, Side::Local, ChangeKind::Deletion));
        assert!(!options.allows(Scope::Attachment, Side::Remote, ChangeKind::Creation));
        assert!(!options.reconciles_attachments());
        assert!(options.use_attachment_digest);
        assert_eq!(options.parallel_operation_amount, 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn builder_toggles_one_check() {
        let options = ReplicateOptions::new()
            .with_check(Side::Local, ChangeKind::Deletion, false)
            .with_attachment_check(Side::Remote, ChangeKind::Modification, true);
        assert!(!options.check_local_deletion);
        assert!(options.check_remote_deletion);
        assert!(options.check_remote_attachment_modification);
        assert!(options.reconciles_attachments());
    }

    #[test]
    fn validation() {
        assert!(ReplicateOptions::new()
            .with_parallel_operations(0)
            .validate()
            .is_err());
        assert!(ReplicateOptions::new()
            .with_parallel_attachment_operations(0)
            .validate()
            .is_err());
        assert!(ReplicateOptions::new()
            .with_signature_hash_key(Vec::<String>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn from_json() {
        let options: ReplicateOptions = serde_json::from_str(
            r#"{
                "conflict_handling": 2,
                "check_local_deletion": false,
                "parallel_operation_amount": 4,
                "report_level": "warning",
                "query": {"equals": {"field": "type", "value": "note"}}
            }"#,
        )
        .unwrap();
        assert_eq!(options.conflict_handling, ConflictPolicy::KeepRemote);
        assert!(!options.check_local_deletion);
        assert!(options.check_local_creation);
        assert_eq!(options.parallel_operation_amount, 4);
        assert_eq!(options.report_level, Severity::Warning);
        assert_eq!(options.query, Filter::equals("type", "note"));
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = serde_json::from_str::<ReplicateOptions>(r#"{"conflict_handling": 7}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported conflict handling: 7"));
    }
}

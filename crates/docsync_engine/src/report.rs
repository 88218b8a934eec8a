//! The ordered audit log of a repair pass.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::conflict::{ChangeKind, Side};

/// Importance of a report entry. Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The pass failed for this id.
    Error,
    /// Data was overwritten or a change was deliberately left alone.
    Warning,
    /// Routine synchronization.
    #[default]
    Info,
}

/// Whether an entry concerns a document or one of its attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Document level.
    Document,
    /// Attachment level.
    Attachment,
}

macro_rules! report_codes {
    ($($variant:ident = $code:literal, $name:literal, $severity:ident;)+) => {
        /// Identifies the action (or non-action) taken for one id or attachment.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ReportCode {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl ReportCode {
            /// Every code, in numeric order.
            pub const ALL: &'static [ReportCode] = &[$(ReportCode::$variant,)+];

            /// Stable numeric code.
            pub fn code(self) -> u16 {
                match self {
                    $(ReportCode::$variant => $code,)+
                }
            }

            /// Stable name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ReportCode::$variant => $name,)+
                }
            }

            /// Severity of entries carrying this code.
            pub fn severity(self) -> Severity {
                match self {
                    $(ReportCode::$variant => Severity::$severity,)+
                }
            }

            /// Look a code up by number.
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(ReportCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

report_codes! {
    NoChange = 0, "no-change", Info;
    PutLocal = 10, "put-local", Info;
    PutRemote = 11, "put-remote", Info;
    PostRemote = 12, "post-remote", Info;
    DeleteLocal = 13, "delete-local", Info;
    DeleteRemote = 14, "delete-remote", Info;
    FalseConflict = 15, "false-conflict", Info;
    ReparentLocal = 16, "reparent-local", Info;
    PutLocalAttachment = 30, "put-local-attachment", Info;
    PutRemoteAttachment = 31, "put-remote-attachment", Info;
    DeleteLocalAttachment = 32, "delete-local-attachment", Info;
    DeleteRemoteAttachment = 33, "delete-remote-attachment", Info;
    FalseConflictAttachment = 34, "false-conflict-attachment", Info;
    ForcePutLocal = 100, "force-put-local", Warning;
    ForcePutRemote = 101, "force-put-remote", Warning;
    ForceDeleteLocal = 102, "force-delete-local", Warning;
    ForceDeleteRemote = 103, "force-delete-remote", Warning;
    SkipConflict = 104, "skip-conflict", Warning;
    SkipLocalCreation = 110, "skip-local-creation", Warning;
    SkipLocalModification = 111, "skip-local-modification", Warning;
    SkipLocalDeletion = 112, "skip-local-deletion", Warning;
    SkipRemoteCreation = 113, "skip-remote-creation", Warning;
    SkipRemoteModification = 114, "skip-remote-modification", Warning;
    SkipRemoteDeletion = 115, "skip-remote-deletion", Warning;
    ForcePutLocalAttachment = 130, "force-put-local-attachment", Warning;
    ForcePutRemoteAttachment = 131, "force-put-remote-attachment", Warning;
    ForceDeleteLocalAttachment = 132, "force-delete-local-attachment", Warning;
    ForceDeleteRemoteAttachment = 133, "force-delete-remote-attachment", Warning;
    SkipConflictAttachment = 134, "skip-conflict-attachment", Warning;
    SkipLocalAttachmentCreation = 140, "skip-local-attachment-creation", Warning;
    SkipLocalAttachmentModification = 141, "skip-local-attachment-modification", Warning;
    SkipLocalAttachmentDeletion = 142, "skip-local-attachment-deletion", Warning;
    SkipRemoteAttachmentCreation = 143, "skip-remote-attachment-creation", Warning;
    SkipRemoteAttachmentModification = 144, "skip-remote-attachment-modification", Warning;
    SkipRemoteAttachmentDeletion = 145, "skip-remote-attachment-deletion", Warning;
    UnresolvedConflict = 200, "unresolved-conflict", Error;
    UnexpectedError = 201, "unexpected-error", Error;
    UnexpectedLocalAttachment = 202, "unexpected-local-attachment", Error;
    UnexpectedRemoteAttachment = 203, "unexpected-remote-attachment", Error;
    UnresolvedAttachmentConflict = 230, "unresolved-attachment-conflict", Error;
}

impl ReportCode {
    /// Copy to `target`.
    pub fn put(scope: Scope, target: Side, forced: bool) -> Self {
        use ReportCode::*;
        match (scope, target, forced) {
            (Scope::Document, Side::Local, false) => PutLocal,
            (Scope::Document, Side::Local, true) => ForcePutLocal,
            (Scope::Document, Side::Remote, false) => PutRemote,
            (Scope::Document, Side::Remote, true) => ForcePutRemote,
            (Scope::Attachment, Side::Local, false) => PutLocalAttachment,
            (Scope::Attachment, Side::Local, true) => ForcePutLocalAttachment,
            (Scope::Attachment, Side::Remote, false) => PutRemoteAttachment,
            (Scope::Attachment, Side::Remote, true) => ForcePutRemoteAttachment,
        }
    }

    /// Delete from `target`.
    pub fn delete(scope: Scope, target: Side, forced: bool) -> Self {
        use ReportCode::*;
        match (scope, target, forced) {
            (Scope::Document, Side::Local, false) => DeleteLocal,
            (Scope::Document, Side::Local, true) => ForceDeleteLocal,
            (Scope::Document, Side::Remote, false) => DeleteRemote,
            (Scope::Document, Side::Remote, true) => ForceDeleteRemote,
            (Scope::Attachment, Side::Local, false) => DeleteLocalAttachment,
            (Scope::Attachment, Side::Local, true) => ForceDeleteLocalAttachment,
            (Scope::Attachment, Side::Remote, false) => DeleteRemoteAttachment,
            (Scope::Attachment, Side::Remote, true) => ForceDeleteRemoteAttachment,
        }
    }

    /// A change on `side` was noticed but its check is disabled.
    pub fn skip(scope: Scope, side: Side, kind: ChangeKind) -> Self {
        use ReportCode::*;
        match (scope, side, kind) {
            (Scope::Document, Side::Local, ChangeKind::Creation) => SkipLocalCreation,
            (Scope::Document, Side::Local, ChangeKind::Modification) => SkipLocalModification,
            (Scope::Document, Side::Local, ChangeKind::Deletion) => SkipLocalDeletion,
            (Scope::Document, Side::Remote, ChangeKind::Creation) => SkipRemoteCreation,
            (Scope::Document, Side::Remote, ChangeKind::Modification) => SkipRemoteModification,
            (Scope::Document, Side::Remote, ChangeKind::Deletion) => SkipRemoteDeletion,
            (Scope::Attachment, Side::Local, ChangeKind::Creation) => SkipLocalAttachmentCreation,
            (Scope::Attachment, Side::Local, ChangeKind::Modification) => {
                SkipLocalAttachmentModification
            }
            (Scope::Attachment, Side::Local, ChangeKind::Deletion) => SkipLocalAttachmentDeletion,
            (Scope::Attachment, Side::Remote, ChangeKind::Creation) => SkipRemoteAttachmentCreation,
            (Scope::Attachment, Side::Remote, ChangeKind::Modification) => {
                SkipRemoteAttachmentModification
            }
            (Scope::Attachment, Side::Remote, ChangeKind::Deletion) => {
                SkipRemoteAttachmentDeletion
            }
        }
    }

    /// Both sides already agreed.
    pub fn false_conflict(scope: Scope) -> Self {
        match scope {
            Scope::Document => ReportCode::FalseConflict,
            Scope::Attachment => ReportCode::FalseConflictAttachment,
        }
    }

    /// True conflict ignored by policy.
    pub fn skip_conflict(scope: Scope) -> Self {
        match scope {
            Scope::Document => ReportCode::SkipConflict,
            Scope::Attachment => ReportCode::SkipConflictAttachment,
        }
    }

    /// True conflict left for a human.
    pub fn unresolved(scope: Scope) -> Self {
        match scope {
            Scope::Document => ReportCode::UnresolvedConflict,
            Scope::Attachment => ReportCode::UnresolvedAttachmentConflict,
        }
    }

    /// A deletion was refused because `side` still holds attachments.
    pub fn unexpected_attachment(side: Side) -> Self {
        match side {
            Side::Local => ReportCode::UnexpectedLocalAttachment,
            Side::Remote => ReportCode::UnexpectedRemoteAttachment,
        }
    }

    /// Whether the code concerns an attachment.
    pub fn is_attachment(self) -> bool {
        self.as_str().contains("attachment")
    }
}

impl fmt::Display for ReportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReportCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// What happened.
    pub code: ReportCode,
    /// Document id (the id at the time of the action).
    pub id: String,
    /// Attachment name, for attachment-level entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// Extra detail, such as the backend error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReportEntry {
    /// Document-level entry.
    pub fn document(code: ReportCode, id: impl Into<String>) -> Self {
        Self {
            code,
            id: id.into(),
            attachment: None,
            message: None,
        }
    }

    /// Attachment-level entry.
    pub fn attachment(code: ReportCode, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code,
            id: id.into(),
            attachment: Some(name.into()),
            message: None,
        }
    }

    /// Attach a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Severity of this entry.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.id)?;
        if let Some(name) = &self.attachment {
            write!(f, " [{name}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Everything a repair pass did, in scan order.
///
/// Entries less severe than the configured level are dropped. Error entries
/// are always kept, and are also collected in [`Report::failures`].
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    level: Severity,
    entries: Vec<ReportEntry>,
    failures: Vec<ReportEntry>,
}

impl Report {
    /// Empty report keeping entries at `level` or more severe.
    pub fn new(level: Severity) -> Self {
        Self {
            level,
            entries: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Append one entry.
    pub fn log(&mut self, entry: ReportEntry) {
        let severity = entry.severity();
        if severity == Severity::Error {
            self.failures.push(entry.clone());
        }
        if severity <= self.level {
            self.entries.push(entry);
        }
    }

    /// Retained entries, in order.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Error entries, in order.
    pub fn failures(&self) -> &[ReportEntry] {
        &self.failures
    }

    /// Whether any error entry was logged.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry was retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained `(code, id)` pairs, handy for assertions.
    pub fn pairs(&self) -> Vec<(ReportCode, &str)> {
        self.entries
            .iter()
            .map(|e| (e.code, e.id.as_str()))
            .collect()
    }

    /// Retained entries for one id.
    pub fn for_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a ReportEntry> + 'a {
        self.entries.iter().filter(move |e| e.id == id)
    }

    /// Count of retained entries per code.
    pub fn summary(&self) -> BTreeMap<ReportCode, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.code).or_insert(0) += 1;
        }
        counts
    }
}

impl Extend<ReportEntry> for Report {
    fn extend<I: IntoIterator<Item = ReportEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.log(entry);
        }
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for code in ReportCode::ALL {
            assert!(seen.insert(code.code()), "duplicate {}", code.code());
            assert_eq!(ReportCode::from_code(code.code()), Some(*code));
        }
        assert_eq!(ReportCode::from_code(999), None);
    }

    #[test]
    fn constructors_pick_matching_codes() {
        assert_eq!(
            ReportCode::put(Scope::Document, Side::Remote, true),
            ReportCode::ForcePutRemote
        );
        assert_eq!(
            ReportCode::delete(Scope::Attachment, Side::Local, false),
            ReportCode::DeleteLocalAttachment
        );
        assert_eq!(
            ReportCode::skip(Scope::Document, Side::Local, ChangeKind::Deletion),
            ReportCode::SkipLocalDeletion
        );
        assert!(ReportCode::SkipRemoteAttachmentCreation.is_attachment());
        assert!(!ReportCode::PutLocal.is_attachment());
    }

    #[test]
    fn level_filters_but_keeps_failures() {
        let mut report = Report::new(Severity::Warning);
        report.log(ReportEntry::document(ReportCode::PutRemote, "a"));
        report.log(ReportEntry::document(ReportCode::ForcePutLocal, "b"));
        report.log(ReportEntry::document(ReportCode::UnresolvedConflict, "c"));
        assert_eq!(
            report.pairs(),
            vec![
                (ReportCode::ForcePutLocal, "b"),
                (ReportCode::UnresolvedConflict, "c")
            ]
        );
        assert_eq!(report.failures().len(), 1);

        let mut errors_only = Report::new(Severity::Error);
        errors_only.log(ReportEntry::document(ReportCode::UnexpectedError, "d"));
        errors_only.log(ReportEntry::document(ReportCode::NoChange, "e"));
        assert_eq!(errors_only.len(), 1);
        assert!(errors_only.has_failures());
    }

    #[test]
    fn entry_display() {
        let entry = ReportEntry::attachment(ReportCode::PutLocalAttachment, "doc", "img")
            .with_message("copied");
        assert_eq!(entry.to_string(), "put-local-attachment doc [img]: copied");
    }

    #[test]
    fn serializes_codes_by_name() {
        let entry = ReportEntry::document(ReportCode::NoChange, "a");
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"code":"no-change","id":"a"}"#
        );
    }
}

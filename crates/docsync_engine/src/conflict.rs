//! Change classification and conflict resolution.
//!
//! Every decision the engine takes for a document or an attachment comes
//! from [`decide`], a pure function of three hashes and the policy.

use serde::{Deserialize, Serialize};

use crate::error::ReplicateError;

/// One of the two replicated stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The local store.
    Local,
    /// The remote store.
    Remote,
}

impl Side {
    /// The other store.
    pub fn opposite(self) -> Self {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

/// How one side moved away from the last synchronized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// No signature yet and the side holds content.
    Creation,
    /// Both the signature and the side exist, with different hashes.
    Modification,
    /// A signature exists but the side no longer holds content.
    Deletion,
}

impl ChangeKind {
    /// Classify a side against the signature. `None` means unchanged.
    pub fn between(signature: Option<&str>, current: Option<&str>) -> Option<Self> {
        match (signature, current) {
            (s, c) if s == c => None,
            (None, Some(_)) => Some(ChangeKind::Creation),
            (Some(_), None) => Some(ChangeKind::Deletion),
            _ => Some(ChangeKind::Modification),
        }
    }
}

/// How true conflicts are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConflictPolicy {
    /// Report the conflict and touch nothing; the pass fails at the end.
    #[default]
    Unresolved,
    /// Local content overwrites remote.
    KeepLocal,
    /// Remote content overwrites local.
    KeepRemote,
    /// Report the conflict as skipped and touch nothing.
    Ignore,
}

impl ConflictPolicy {
    /// Converts to a code.
    pub fn to_code(self) -> u8 {
        match self {
            ConflictPolicy::Unresolved => 0,
            ConflictPolicy::KeepLocal => 1,
            ConflictPolicy::KeepRemote => 2,
            ConflictPolicy::Ignore => 3,
        }
    }

    /// Converts from a code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConflictPolicy::Unresolved),
            1 => Some(ConflictPolicy::KeepLocal),
            2 => Some(ConflictPolicy::KeepRemote),
            3 => Some(ConflictPolicy::Ignore),
            _ => None,
        }
    }

    /// The side this policy lets win, if any.
    pub fn winner(self) -> Option<Side> {
        match self {
            ConflictPolicy::KeepLocal => Some(Side::Local),
            ConflictPolicy::KeepRemote => Some(Side::Remote),
            ConflictPolicy::Unresolved | ConflictPolicy::Ignore => None,
        }
    }
}

impl TryFrom<u8> for ConflictPolicy {
    type Error = ReplicateError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| {
            ReplicateError::InvalidOptions(format!("unsupported conflict handling: {code}"))
        })
    }
}

impl From<ConflictPolicy> for u8 {
    fn from(policy: ConflictPolicy) -> Self {
        policy.to_code()
    }
}

/// Copy content from one side to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Propagation {
    /// Side whose state is authoritative.
    pub from: Side,
    /// The target had diverged and is being overwritten.
    pub forced: bool,
    /// The authoritative side holds nothing, so the target is deleted.
    pub delete: bool,
}

impl Propagation {
    /// Side being written.
    pub fn target(&self) -> Side {
        self.from.opposite()
    }
}

/// What to do about one id (or one attachment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Both sides already agree. The signature is rewritten, or deleted when
    /// both sides are empty.
    FalseConflict {
        /// Whether a signature should remain.
        keep_signature: bool,
    },
    /// Make the target match the authoritative side.
    Propagate(Propagation),
    /// True conflict left alone by the policy.
    SkipConflict,
    /// True conflict nobody may settle.
    Unresolved,
}

/// Decide how to handle a change noticed on `source`.
///
/// `source_hash` and `target_hash` are the current hashes of the source and
/// the opposite side (`None` when absent); `signature` is the hash recorded
/// at the last synchronization.
pub fn decide(
    source: Side,
    source_hash: Option<&str>,
    target_hash: Option<&str>,
    signature: Option<&str>,
    policy: ConflictPolicy,
) -> Decision {
    if source_hash == target_hash {
        return Decision::FalseConflict {
            keep_signature: source_hash.is_some(),
        };
    }

    let target_untouched = target_hash == signature;
    let winner = policy.winner();

    if target_untouched || winner == Some(source) {
        return Decision::Propagate(Propagation {
            from: source,
            forced: !target_untouched,
            delete: source_hash.is_none(),
        });
    }

    if policy == ConflictPolicy::Ignore {
        return Decision::SkipConflict;
    }

    if winner == Some(source.opposite()) || source_hash.is_none() {
        // A deletion never beats a modification.
        return Decision::Propagate(Propagation {
            from: source.opposite(),
            forced: true,
            delete: target_hash.is_none(),
        });
    }

    if target_hash.is_none() {
        return Decision::Propagate(Propagation {
            from: source,
            forced: true,
            delete: false,
        });
    }

    Decision::Unresolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Option<&str> = Some("a");
    const B: Option<&str> = Some("b");
    const C: Option<&str> = Some("c");

    fn push(from: Side, forced: bool, delete: bool) -> Decision {
        Decision::Propagate(Propagation {
            from,
            forced,
            delete,
        })
    }

    #[test]
    fn classify_changes() {
        assert_eq!(ChangeKind::between(A, A), None);
        assert_eq!(ChangeKind::between(None, None), None);
        assert_eq!(ChangeKind::between(None, A), Some(ChangeKind::Creation));
        assert_eq!(ChangeKind::between(A, None), Some(ChangeKind::Deletion));
        assert_eq!(ChangeKind::between(A, B), Some(ChangeKind::Modification));
    }

    #[test]
    fn policy_codes() {
        for code in 0..4 {
            let policy = ConflictPolicy::from_code(code).unwrap();
            assert_eq!(policy.to_code(), code);
        }
        assert!(ConflictPolicy::from_code(4).is_none());
        assert!(ConflictPolicy::try_from(9).is_err());
    }

    #[test]
    fn one_sided_changes_propagate() {
        let p = ConflictPolicy::Unresolved;
        // modification
        assert_eq!(decide(Side::Local, B, A, A, p), push(Side::Local, false, false));
        // creation
        assert_eq!(decide(Side::Remote, A, None, None, p), push(Side::Remote, false, false));
        // deletion
        assert_eq!(decide(Side::Local, None, A, A, p), push(Side::Local, false, true));
    }

    #[test]
    fn identical_sides_are_false_conflicts() {
        let p = ConflictPolicy::Unresolved;
        assert_eq!(
            decide(Side::Local, B, B, A, p),
            Decision::FalseConflict {
                keep_signature: true
            }
        );
        assert_eq!(
            decide(Side::Local, None, None, A, p),
            Decision::FalseConflict {
                keep_signature: false
            }
        );
    }

    #[test]
    fn true_conflict_under_each_policy() {
        assert_eq!(
            decide(Side::Local, B, C, A, ConflictPolicy::Unresolved),
            Decision::Unresolved
        );
        assert_eq!(
            decide(Side::Local, B, C, A, ConflictPolicy::KeepLocal),
            push(Side::Local, true, false)
        );
        assert_eq!(
            decide(Side::Local, B, C, A, ConflictPolicy::KeepRemote),
            push(Side::Remote, true, false)
        );
        assert_eq!(
            decide(Side::Local, B, C, A, ConflictPolicy::Ignore),
            Decision::SkipConflict
        );
    }

    #[test]
    fn creations_on_both_sides_conflict() {
        assert_eq!(
            decide(Side::Local, A, B, None, ConflictPolicy::Unresolved),
            Decision::Unresolved
        );
        assert_eq!(
            decide(Side::Local, A, B, None, ConflictPolicy::KeepRemote),
            push(Side::Remote, true, false)
        );
    }

    #[test]
    fn modification_beats_deletion() {
        // local modified, remote deleted
        assert_eq!(
            decide(Side::Local, B, None, A, ConflictPolicy::Unresolved),
            push(Side::Local, true, false)
        );
        // local deleted, remote modified
        assert_eq!(
            decide(Side::Local, None, B, A, ConflictPolicy::Unresolved),
            push(Side::Remote, true, false)
        );
        // unless the policy says otherwise
        assert_eq!(
            decide(Side::Local, B, None, A, ConflictPolicy::KeepRemote),
            push(Side::Remote, true, true)
        );
        assert_eq!(
            decide(Side::Local, None, B, A, ConflictPolicy::KeepLocal),
            push(Side::Local, true, true)
        );
    }
}

//! Shared helpers for replicator integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use docsync_engine::{Report, ReportCode, ReplicateError, ReplicateOptions, Replicator};
use docsync_storage::DocumentStorage;
use docsync_testkit::ReplicaSet;

/// A replicator over the three stores of `set`.
pub fn replicator(set: &ReplicaSet, options: ReplicateOptions) -> Replicator {
    Replicator::new(set.local_dyn(), set.remote_dyn(), set.signatures_dyn(), options)
        .expect("valid options")
}

/// A replicator whose remote side is `remote` instead of the set's own.
pub fn replicator_with_remote(
    set: &ReplicaSet,
    remote: Arc<dyn DocumentStorage>,
    options: ReplicateOptions,
) -> Replicator {
    Replicator::new(set.local_dyn(), remote, set.signatures_dyn(), options)
        .expect("valid options")
}

/// A replicator keeping its signatures in `signatures` instead of the set's
/// own store.
pub fn replicator_with_signatures(
    set: &ReplicaSet,
    signatures: Arc<dyn DocumentStorage>,
    options: ReplicateOptions,
) -> Replicator {
    Replicator::new(set.local_dyn(), set.remote_dyn(), signatures, options)
        .expect("valid options")
}

/// Run a pass that must come out clean.
pub async fn repair_ok(replicator: &Replicator) -> Report {
    match replicator.repair().await {
        Ok(report) => report,
        Err(e) => panic!("repair failed: {e}; report: {:?}", e.report()),
    }
}

/// Run a pass that must end with unresolved entries.
pub async fn repair_unresolved(replicator: &Replicator) -> Report {
    match replicator.repair().await {
        Ok(report) => panic!("repair unexpectedly clean: {report:?}"),
        Err(ReplicateError::Unresolved(failure)) => failure.into_report(),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

/// `(code, id)` pairs, owned.
pub fn pairs(report: &Report) -> Vec<(ReportCode, String)> {
    report
        .entries()
        .iter()
        .map(|e| (e.code, e.id.clone()))
        .collect()
}

/// `(code, id, attachment)` triples, owned.
pub fn triples(report: &Report) -> Vec<(ReportCode, String, Option<String>)> {
    report
        .entries()
        .iter()
        .map(|e| (e.code, e.id.clone(), e.attachment.clone()))
        .collect()
}

/// Shorthand for an expected `(code, id)` pair.
pub fn entry(code: ReportCode, id: &str) -> (ReportCode, String) {
    (code, id.to_string())
}

/// Shorthand for an expected attachment triple.
pub fn att(code: ReportCode, id: &str, name: &str) -> (ReportCode, String, Option<String>) {
    (code, id.to_string(), Some(name.to_string()))
}

/// Shorthand for an expected document triple.
pub fn docent(code: ReportCode, id: &str) -> (ReportCode, String, Option<String>) {
    (code, id.to_string(), None)
}

//! Attachment reconciliation and re-parenting.

mod common;

use std::sync::Arc;

use common::*;
use docsync_engine::{ChangeKind, ConflictPolicy, ReplicateOptions, ReportCode, Side, SignatureStore};
use docsync_storage::{Capabilities, Capacity, DocumentStorage};
use docsync_testkit::prelude::*;

fn with_attachments() -> ReplicateOptions {
    ReplicateOptions::new().with_all_attachment_checks()
}

#[tokio::test]
async fn attachments_are_ignored_by_default() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();

    let report = repair_ok(&replicator(&set, ReplicateOptions::default())).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::FalseConflict, "a")]);
    assert!(set.remote.all_attachments("a").await.unwrap().is_empty());
}

#[tokio::test]
async fn new_attachment_follows_its_document() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    let replicator = replicator(&set, with_attachments());

    let report = repair_ok(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::FalseConflict, "a"),
            att(ReportCode::PutRemoteAttachment, "a", "img"),
        ]
    );
    assert_eq!(set.remote.get_attachment("a", "img").await.unwrap(), blob("x"));
    assert!(set.converged());

    // unchanged sets are skipped without any attachment entry
    let report = repair_ok(&replicator).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::NoChange, "a")]);

    set.remote.put_attachment("a", "img", blob("y")).await.unwrap();
    let report = repair_ok(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::NoChange, "a"),
            att(ReportCode::PutLocalAttachment, "a", "img"),
        ]
    );
    assert_eq!(set.local.get_attachment("a", "img").await.unwrap(), blob("y"));
}

#[tokio::test]
async fn attachments_are_compared_by_content_without_digests() {
    let caps = Capabilities::all().without(Capacity::AttachmentDigest);
    let set = ReplicaSet::with_capabilities(caps, caps);
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.remote.put_attachment("a", "img", blob("x")).await.unwrap();
    let replicator = replicator(&set, with_attachments());

    let report = repair_ok(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::FalseConflict, "a"),
            att(ReportCode::FalseConflictAttachment, "a", "img"),
        ]
    );

    let report = repair_ok(&replicator).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::NoChange, "a")]);
}

#[tokio::test]
async fn attachment_toggles_are_independent() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    let options = ReplicateOptions::new().with_attachment_check(
        Side::Local,
        ChangeKind::Creation,
        true,
    );
    let replicator = replicator(&set, options);
    repair_ok(&replicator).await;

    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.remote.put_attachment("a", "doc", blob("y")).await.unwrap();
    let report = repair_ok(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::NoChange, "a"),
            att(ReportCode::SkipRemoteAttachmentCreation, "a", "doc"),
            att(ReportCode::PutRemoteAttachment, "a", "img"),
        ]
    );
    assert!(set.local.get_attachment("a", "doc").await.is_err());
}

async fn attachment_conflict() -> ReplicaSet {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.remote.put_attachment("a", "img", blob("x")).await.unwrap();
    repair_ok(&replicator(&set, with_attachments())).await;
    set.local.put_attachment("a", "img", blob("local")).await.unwrap();
    set.remote.put_attachment("a", "img", blob("remote")).await.unwrap();
    set
}

#[tokio::test]
async fn attachment_conflicts_follow_the_policy() {
    let set = attachment_conflict().await;
    let report = repair_unresolved(&replicator(&set, with_attachments())).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::NoChange, "a"),
            att(ReportCode::UnresolvedAttachmentConflict, "a", "img"),
        ]
    );

    let options = with_attachments().with_conflict_handling(ConflictPolicy::KeepRemote);
    let report = repair_ok(&replicator(&set, options)).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::NoChange, "a"),
            att(ReportCode::ForcePutLocalAttachment, "a", "img"),
        ]
    );
    assert_eq!(
        set.local.get_attachment("a", "img").await.unwrap(),
        blob("remote")
    );
}

#[tokio::test]
async fn skipped_documents_leave_attachments_alone() {
    let set = attachment_conflict().await;
    set.local.put("a", doc(json!({"v": "local"}))).await.unwrap();
    set.remote.put("a", doc(json!({"v": "remote"}))).await.unwrap();

    let options = with_attachments().with_conflict_handling(ConflictPolicy::Ignore);
    let report = repair_ok(&replicator(&set, options)).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::SkipConflict, "a")]);
}

#[tokio::test]
async fn deletion_is_refused_while_attachments_remain() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    let replicator = replicator(&set, ReplicateOptions::default());
    repair_ok(&replicator).await;

    set.remote.put_attachment("a", "img", blob("x")).await.unwrap();
    set.local.remove("a").await.unwrap();
    let report = repair_unresolved(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![docent(ReportCode::UnexpectedRemoteAttachment, "a")]
    );
    assert!(set.remote.get("a").await.is_ok());
}

#[tokio::test]
async fn deletion_takes_synchronized_attachments_along() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.remote.put_attachment("a", "img", blob("x")).await.unwrap();
    let replicator = replicator(&set, with_attachments());
    repair_ok(&replicator).await;

    set.local.remove("a").await.unwrap();
    let report = repair_ok(&replicator).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::DeleteRemote, "a"),
            att(ReportCode::DeleteRemoteAttachment, "a", "img"),
        ]
    );
    assert!(set.remote.is_empty());
    assert!(set.signatures.is_empty());
}

#[tokio::test]
async fn forced_deletion_removes_attachments() {
    let set = ReplicaSet::new();
    set.put_both("a", doc(json!({"v": 1}))).await;
    let replicator = replicator(
        &set,
        ReplicateOptions::new().with_conflict_handling(ConflictPolicy::KeepRemote),
    );
    repair_ok(&replicator).await;

    set.local.put("a", doc(json!({"v": 2}))).await.unwrap();
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.remote.remove("a").await.unwrap();
    let report = repair_ok(&replicator).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::ForceDeleteLocal, "a")]);
    assert!(set.local.is_empty());
}

#[tokio::test]
async fn one_failing_attachment_does_not_stop_the_others() {
    let set = ReplicaSet::new();
    let remote = Arc::new(FaultyStorage::new(set.remote_dyn()));
    remote.break_attachment("a", "img");
    set.put_both("a", doc(json!({}))).await;
    set.local.put_attachment("a", "img", blob("x")).await.unwrap();
    set.local.put_attachment("a", "txt", blob("y")).await.unwrap();

    let report = repair_unresolved(&replicator_with_remote(&set, remote, with_attachments())).await;
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::FalseConflict, "a"),
            att(ReportCode::UnexpectedError, "a", "img"),
            att(ReportCode::PutRemoteAttachment, "a", "txt"),
        ]
    );
    assert_eq!(report.failures().len(), 1);
    assert!(set.remote.get_attachment("a", "txt").await.is_ok());
}

#[tokio::test]
async fn posted_documents_take_their_attachments_to_the_new_id() {
    let set = ReplicaSet::new();
    set.local.put("tmp", doc(json!({"title": "draft"}))).await.unwrap();
    set.local.put_attachment("tmp", "img", blob("x")).await.unwrap();
    let options = with_attachments().with_remote_post(true);
    let replicator = replicator(&set, options);

    let report = repair_ok(&replicator).await;
    let ids = set.local.ids();
    assert_eq!(ids.len(), 1);
    let new_id = ids[0].clone();
    assert_ne!(new_id, "tmp");
    assert_eq!(
        triples(&report),
        vec![
            docent(ReportCode::PostRemote, "tmp"),
            att(ReportCode::PutRemoteAttachment, &new_id, "img"),
        ]
    );
    assert_eq!(
        report.entries()[0].message.as_deref(),
        Some(format!("now {new_id}").as_str())
    );

    assert_eq!(set.remote.ids(), vec![new_id.clone()]);
    assert_eq!(set.local.get_attachment(&new_id, "img").await.unwrap(), blob("x"));
    assert_eq!(set.remote.get_attachment(&new_id, "img").await.unwrap(), blob("x"));
    assert_eq!(set.signatures.ids(), vec![new_id.clone()]);
    let signatures = SignatureStore::new(set.signatures_dyn());
    assert!(signatures.get(&new_id).await.unwrap().unwrap().migrated_to.is_none());
    assert_eq!(signatures.attachments(&new_id).await.unwrap().len(), 1);

    let report = repair_ok(&replicator).await;
    assert_eq!(triples(&report), vec![docent(ReportCode::NoChange, &new_id)]);
}

//! Per-document reconciliation.

use std::sync::Arc;

use docsync_storage::{DocumentStorage, OptionalExt};
use tracing::{debug, warn};

use crate::config::ReplicateOptions;
use crate::conflict::{decide, ChangeKind, Decision, Propagation, Side};
use crate::error::ReplicateResult;
use crate::executor::OperationPool;
use crate::hasher::Hasher;
use crate::report::{ReportCode, ReportEntry, Scope};
use crate::scanner::Candidate;
use crate::signature::{SignatureRecord, SignatureStore};

/// Attempts per id when a backend reports a concurrent change.
pub(crate) const MAX_ATTEMPTS: usize = 3;

/// Where a document ended up after its step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Both sides hold the signed content under `id`.
    Synchronized {
        /// Final document id.
        id: String,
    },
    /// Deleted, skipped or left in conflict.
    Settled,
}

/// Everything one repair pass needs.
pub(crate) struct Pass {
    pub(crate) local: Arc<dyn DocumentStorage>,
    pub(crate) remote: Arc<dyn DocumentStorage>,
    pub(crate) signatures: SignatureStore,
    pub(crate) options: ReplicateOptions,
    pub(crate) hasher: Hasher,
    pub(crate) documents: OperationPool,
    pub(crate) attachments: OperationPool,
}

impl Pass {
    pub(crate) fn storage(&self, side: Side) -> &Arc<dyn DocumentStorage> {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    /// Reconcile one id and return its report entries.
    ///
    /// Only cancellation is returned as an error; every other failure ends
    /// up in the entries.
    pub(crate) async fn reconcile(&self, candidate: Candidate) -> ReplicateResult<Vec<ReportEntry>> {
        if let Some(reason) = &candidate.unreadable {
            warn!(id = %candidate.id, %reason, "document left alone");
            return Ok(vec![unexpected(&candidate.id, reason)]);
        }

        let mut candidate = candidate;
        let mut attempt = 1;
        loop {
            let mut log = Vec::new();
            let err = match self.reconcile_once(&candidate, &mut log).await {
                Ok(Outcome::Synchronized { id }) => {
                    if self.options.reconciles_attachments() {
                        self.reconcile_attachments(&id, &mut log).await?;
                    }
                    return Ok(log);
                }
                Ok(Outcome::Settled) => return Ok(log),
                Err(e) => e,
            };

            if err.is_cancelled() {
                return Err(err);
            }
            if err.is_stale() && attempt < MAX_ATTEMPTS {
                debug!(id = %candidate.id, attempt, error = %err, "re-reading after concurrent change");
                attempt += 1;
                match self.refresh(&candidate.id).await {
                    Ok(fresh) => {
                        candidate = fresh;
                        continue;
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(id = %candidate.id, error = %e, "re-reading failed");
                        log.push(unexpected(&candidate.id, &e));
                        return Ok(log);
                    }
                }
            }

            warn!(id = %candidate.id, error = %err, "document step failed");
            log.push(unexpected(&candidate.id, &err));
            return Ok(log);
        }
    }

    async fn reconcile_once(
        &self,
        candidate: &Candidate,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<Outcome> {
        if let Some(new_id) = candidate.pending_migration() {
            return self.resume_reparent(candidate, new_id, log).await;
        }

        let signature = candidate.signature_hash();
        let mut skipped = false;
        let mut remote_changed = false;
        for side in [Side::Local, Side::Remote] {
            let Some(kind) = ChangeKind::between(signature, candidate.hash(side)) else {
                continue;
            };
            if side == Side::Remote {
                remote_changed = true;
            }
            if self.options.allows(Scope::Document, side, kind) {
                return self.resolve(candidate, side, log).await;
            }
            log.push(ReportEntry::document(
                ReportCode::skip(Scope::Document, side, kind),
                &candidate.id,
            ));
            skipped = true;
        }

        if !remote_changed {
            log.push(ReportEntry::document(ReportCode::NoChange, &candidate.id));
        }
        if skipped || candidate.signature.is_none() {
            return Ok(Outcome::Settled);
        }
        Ok(Outcome::Synchronized {
            id: candidate.id.clone(),
        })
    }

    async fn resolve(
        &self,
        candidate: &Candidate,
        source: Side,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<Outcome> {
        let id = &candidate.id;
        let source_hash = candidate.hash(source);
        let decision = decide(
            source,
            source_hash,
            candidate.hash(source.opposite()),
            candidate.signature_hash(),
            self.options.conflict_handling,
        );
        debug!(%id, ?source, ?decision, "document decision");

        match decision {
            Decision::FalseConflict { keep_signature } => {
                let outcome = match source_hash {
                    Some(hash) if keep_signature => {
                        let record = SignatureRecord::new(hash, source == Side::Local)
                            .with_attachment_hash(previous_attachment_hash(candidate));
                        self.signatures.put(id, &record).await?;
                        Outcome::Synchronized { id: id.clone() }
                    }
                    _ => {
                        self.signatures.remove(id).await?;
                        Outcome::Settled
                    }
                };
                log.push(ReportEntry::document(
                    ReportCode::false_conflict(Scope::Document),
                    id,
                ));
                Ok(outcome)
            }
            Decision::SkipConflict => {
                warn!(%id, "conflict skipped by policy");
                log.push(ReportEntry::document(
                    ReportCode::skip_conflict(Scope::Document),
                    id,
                ));
                Ok(Outcome::Settled)
            }
            Decision::Unresolved => {
                warn!(%id, "unresolved conflict");
                log.push(ReportEntry::document(
                    ReportCode::unresolved(Scope::Document),
                    id,
                ));
                Ok(Outcome::Settled)
            }
            Decision::Propagate(propagation) => self.propagate(candidate, propagation, log).await,
        }
    }

    async fn propagate(
        &self,
        candidate: &Candidate,
        propagation: Propagation,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<Outcome> {
        let id = &candidate.id;
        let target = propagation.target();

        if propagation.delete {
            // attachment entries follow the document entry
            let mut attachment_log = Vec::new();
            let outcome = self
                .delete(candidate, propagation, &mut attachment_log, log)
                .await;
            log.append(&mut attachment_log);
            return outcome;
        }

        let doc = self.storage(propagation.from).get(id).await?;
        let hash = self.hasher.document_hash(&doc)?;

        // a remote copy hidden by the query is overwritten, not posted again
        let post = target == Side::Remote
            && self.options.use_remote_post
            && self.remote.get(id).await.optional()?.is_none();
        if post {
            let new_id = self.post_and_reparent(id, doc, hash, log).await?;
            return Ok(Outcome::Synchronized { id: new_id });
        }

        self.storage(target).put(id, doc).await?;
        let record = SignatureRecord::new(hash, propagation.from == Side::Local)
            .with_attachment_hash(previous_attachment_hash(candidate));
        self.signatures.put(id, &record).await?;
        log.push(ReportEntry::document(
            ReportCode::put(Scope::Document, target, propagation.forced),
            id,
        ));
        Ok(Outcome::Synchronized { id: id.clone() })
    }

    /// Delete `candidate` on the target side. A non-forced deletion first
    /// reconciles the attachments into `attachment_log` and is refused while
    /// any remain.
    async fn delete(
        &self,
        candidate: &Candidate,
        propagation: Propagation,
        attachment_log: &mut Vec<ReportEntry>,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<Outcome> {
        let id = &candidate.id;
        let target = propagation.target();
        if !propagation.forced {
            if self.options.reconciles_attachments() && candidate.signature.is_some() {
                self.reconcile_attachments(id, attachment_log).await?;
            }
            let left = self
                .storage(target)
                .all_attachments(id)
                .await
                .optional()?
                .unwrap_or_default();
            if !left.is_empty() {
                warn!(%id, ?target, count = left.len(), "deletion refused, attachments left");
                log.push(
                    ReportEntry::document(ReportCode::unexpected_attachment(target), id)
                        .with_message(format!("{} attachment(s) still present", left.len())),
                );
                return Ok(Outcome::Settled);
            }
        }

        self.storage(target).remove(id).await.optional()?;
        self.signatures.remove(id).await?;
        log.push(ReportEntry::document(
            ReportCode::delete(Scope::Document, target, propagation.forced),
            id,
        ));
        Ok(Outcome::Settled)
    }

    /// Re-read both sides and the signature of `id`.
    async fn refresh(&self, id: &str) -> ReplicateResult<Candidate> {
        Ok(Candidate {
            id: id.to_string(),
            local: self.current_hash(Side::Local, id).await?,
            remote: self.current_hash(Side::Remote, id).await?,
            signature: self.signatures.get(id).await?,
            unreadable: None,
        })
    }

    async fn current_hash(&self, side: Side, id: &str) -> ReplicateResult<Option<String>> {
        match self.storage(side).get(id).await.optional()? {
            Some(doc) if self.options.query.matches(&doc) => {
                Ok(Some(self.hasher.document_hash(&doc)?))
            }
            _ => Ok(None),
        }
    }
}

fn previous_attachment_hash(candidate: &Candidate) -> Option<String> {
    candidate
        .signature
        .as_ref()
        .and_then(|s| s.attachment_hash.clone())
}

pub(crate) fn unexpected(id: &str, err: &impl std::fmt::Display) -> ReportEntry {
    ReportEntry::document(ReportCode::UnexpectedError, id).with_message(err.to_string())
}

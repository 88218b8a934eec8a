//! Attachment reconciliation for one synchronized document.
//!
//! Attachments are compared the same way documents are: current hash on
//! each side against the attachment signature, each side gated by its own
//! check toggle. Attachments that did not change are not reported.

use std::collections::{BTreeMap, BTreeSet};

use docsync_storage::{AttachmentInfo, OptionalExt};
use tracing::{debug, warn};

use crate::conflict::{decide, ChangeKind, Decision, Side};
use crate::error::ReplicateResult;
use crate::reconcile::{unexpected, Pass};
use crate::report::{ReportCode, ReportEntry, Scope};
use crate::signature::SignatureRecord;

type Listing = BTreeMap<String, AttachmentInfo>;

struct Listings {
    local: Listing,
    remote: Listing,
    signed: BTreeMap<String, String>,
    record: Option<SignatureRecord>,
}

/// Current hashes of one attachment plus its signature.
struct AttachmentState<'a> {
    id: &'a str,
    name: &'a str,
    local: Option<String>,
    remote: Option<String>,
    signature: Option<&'a str>,
}

impl AttachmentState<'_> {
    fn hash(&self, side: Side) -> Option<&str> {
        match side {
            Side::Local => self.local.as_deref(),
            Side::Remote => self.remote.as_deref(),
        }
    }
}

impl Pass {
    /// Reconcile every attachment of `id`, appending entries to `log`.
    ///
    /// Only cancellation is returned as an error.
    pub(crate) async fn reconcile_attachments(
        &self,
        id: &str,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<()> {
        let listings = match self.attachments.run(self.list_attachments(id)).await {
            Ok(listings) => listings,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(%id, error = %e, "cannot list attachments");
                log.push(unexpected(id, &e));
                return Ok(());
            }
        };

        if self.attachments_unchanged(&listings) {
            debug!(%id, "attachment sets match their signature");
            return Ok(());
        }

        let names: BTreeSet<&String> = listings
            .local
            .keys()
            .chain(listings.remote.keys())
            .chain(listings.signed.keys())
            .collect();
        let listings = &listings;
        let entries = self
            .attachments
            .run_all(names, |name| async move {
                let mut entries = Vec::new();
                match self.reconcile_attachment(id, name, listings, &mut entries).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(%id, %name, error = %e, "attachment step failed");
                        entries.push(
                            ReportEntry::attachment(ReportCode::UnexpectedError, id, name.as_str())
                                .with_message(e.to_string()),
                        );
                    }
                }
                Ok(entries)
            })
            .await?;
        log.extend(entries.into_iter().flatten());

        if let Err(e) = self.refresh_attachment_hash(id).await {
            if e.is_cancelled() {
                return Err(e);
            }
            warn!(%id, error = %e, "cannot record attachment set hash");
            log.push(unexpected(id, &e));
        }
        Ok(())
    }

    async fn list_attachments(&self, id: &str) -> ReplicateResult<Listings> {
        let local = self.local.all_attachments(id).await.optional()?;
        let remote = self.remote.all_attachments(id).await.optional()?;
        Ok(Listings {
            local: local.unwrap_or_default(),
            remote: remote.unwrap_or_default(),
            signed: self.signatures.attachments(id).await?,
            record: self.signatures.get(id).await?,
        })
    }

    /// Whether both listings carry digests whose set hashes equal the
    /// recorded one.
    fn attachments_unchanged(&self, listings: &Listings) -> bool {
        if !self.options.use_attachment_digest {
            return false;
        }
        let Some(recorded) = listings
            .record
            .as_ref()
            .and_then(|r| r.attachment_hash.as_deref())
        else {
            return false;
        };
        let set_hash = |listing: &Listing| {
            let digests = listing
                .iter()
                .map(|(name, info)| Some((name.clone(), info.digest.clone()?)))
                .collect::<Option<BTreeMap<_, _>>>()?;
            self.hasher.attachment_set_hash(&digests).ok()
        };
        matches!(
            (set_hash(&listings.local), set_hash(&listings.remote)),
            (Some(l), Some(r)) if l == recorded && r == recorded
        )
    }

    async fn reconcile_attachment(
        &self,
        id: &str,
        name: &str,
        listings: &Listings,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<()> {
        let state = AttachmentState {
            id,
            name,
            local: self.side_hash(Side::Local, id, name, listings.local.get(name)).await?,
            remote: self.side_hash(Side::Remote, id, name, listings.remote.get(name)).await?,
            signature: listings.signed.get(name).map(String::as_str),
        };

        for side in [Side::Local, Side::Remote] {
            let Some(kind) = ChangeKind::between(state.signature, state.hash(side)) else {
                continue;
            };
            if self.options.allows(Scope::Attachment, side, kind) {
                return self.resolve_attachment(&state, side, log).await;
            }
            log.push(ReportEntry::attachment(
                ReportCode::skip(Scope::Attachment, side, kind),
                id,
                name,
            ));
        }
        Ok(())
    }

    /// Hash of one attachment on one side, from the listing digest when
    /// allowed, otherwise from its content.
    async fn side_hash(
        &self,
        side: Side,
        id: &str,
        name: &str,
        info: Option<&AttachmentInfo>,
    ) -> ReplicateResult<Option<String>> {
        let Some(info) = info else {
            return Ok(None);
        };
        if self.options.use_attachment_digest {
            if let Some(digest) = &info.digest {
                return Ok(Some(digest.clone()));
            }
        }
        let attachment = self.storage(side).get_attachment(id, name).await.optional()?;
        Ok(attachment.map(|a| self.hasher.attachment_hash(&a.data)))
    }

    async fn resolve_attachment(
        &self,
        state: &AttachmentState<'_>,
        source: Side,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<()> {
        let (id, name) = (state.id, state.name);
        let source_hash = state.hash(source);
        let decision = decide(
            source,
            source_hash,
            state.hash(source.opposite()),
            state.signature,
            self.options.conflict_handling,
        );
        debug!(%id, %name, ?source, ?decision, "attachment decision");

        let code = match decision {
            Decision::FalseConflict { keep_signature } => {
                match source_hash {
                    Some(hash) if keep_signature => {
                        self.signatures.put_attachment(id, name, hash).await?;
                    }
                    _ => self.signatures.remove_attachment(id, name).await?,
                }
                ReportCode::false_conflict(Scope::Attachment)
            }
            Decision::SkipConflict => {
                warn!(%id, %name, "attachment conflict skipped by policy");
                ReportCode::skip_conflict(Scope::Attachment)
            }
            Decision::Unresolved => {
                warn!(%id, %name, "unresolved attachment conflict");
                ReportCode::unresolved(Scope::Attachment)
            }
            Decision::Propagate(propagation) => {
                let target = propagation.target();
                if propagation.delete {
                    self.storage(target)
                        .remove_attachment(id, name)
                        .await
                        .optional()?;
                    self.signatures.remove_attachment(id, name).await?;
                    ReportCode::delete(Scope::Attachment, target, propagation.forced)
                } else {
                    let attachment = self.storage(propagation.from).get_attachment(id, name).await?;
                    let hash = self.hasher.attachment_hash(&attachment.data);
                    self.storage(target).put_attachment(id, name, attachment).await?;
                    self.signatures.put_attachment(id, name, &hash).await?;
                    ReportCode::put(Scope::Attachment, target, propagation.forced)
                }
            }
        };
        log.push(ReportEntry::attachment(code, id, name));
        Ok(())
    }

    /// Record the hash of the signed attachment set on the document
    /// signature.
    async fn refresh_attachment_hash(&self, id: &str) -> ReplicateResult<()> {
        let Some(record) = self.signatures.get(id).await? else {
            return Ok(());
        };
        let signed = self.signatures.attachments(id).await?;
        let hash = self.hasher.attachment_set_hash(&signed)?;
        if record.attachment_hash.as_deref() != Some(hash.as_str()) {
            let record = record.with_attachment_hash(Some(hash));
            self.signatures.put(id, &record).await?;
        }
        Ok(())
    }
}

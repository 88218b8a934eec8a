//! Moving a local document to the id the remote store assigned it.
//!
//! The move is journaled in the signature of the old id (`migrated_to`), so
//! a pass interrupted halfway is finished by the next one instead of posting
//! the document a second time.

use docsync_codec::Document;
use docsync_storage::OptionalExt;
use tracing::{debug, info, warn};

use crate::error::{ReplicateError, ReplicateResult};
use crate::reconcile::{Outcome, Pass, MAX_ATTEMPTS};
use crate::report::{ReportCode, ReportEntry};
use crate::scanner::Candidate;
use crate::signature::SignatureRecord;

impl Pass {
    /// Create `doc` remotely under a fresh id and move the local copy there.
    /// Returns the new id.
    pub(crate) async fn post_and_reparent(
        &self,
        old_id: &str,
        doc: Document,
        hash: String,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<String> {
        let new_id = self.remote.post(doc).await?;
        debug!(%old_id, %new_id, "posted to remote");

        // from here on the remote copy exists; no error may lead to a second post
        let journal = SignatureRecord::new(hash, true).migrating_to(new_id.as_str());
        let moved = match self.write_journal(old_id, &journal).await {
            Ok(()) => self.finish_reparent(old_id, &new_id, &journal).await,
            Err(e) => Err(e),
        };
        if let Err(source) = moved {
            warn!(%old_id, %new_id, error = %source, "re-parenting interrupted");
            return Err(ReplicateError::Reparent {
                id: old_id.to_string(),
                new_id,
                source: Box::new(source),
            });
        }

        log.push(
            ReportEntry::document(ReportCode::PostRemote, old_id)
                .with_message(format!("now {new_id}")),
        );
        Ok(new_id)
    }

    /// Journal the move on the old id, retrying concurrent changes in place.
    async fn write_journal(&self, old_id: &str, journal: &SignatureRecord) -> ReplicateResult<()> {
        let mut attempt = 1;
        loop {
            match self.signatures.put(old_id, journal).await {
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    debug!(%old_id, attempt, error = %e, "journal write conflicted");
                    attempt += 1;
                }
                written => return written.map_err(ReplicateError::from),
            }
        }
    }

    /// Complete a journaled move found by the scan.
    pub(crate) async fn resume_reparent(
        &self,
        candidate: &Candidate,
        new_id: &str,
        log: &mut Vec<ReportEntry>,
    ) -> ReplicateResult<Outcome> {
        let Some(journal) = &candidate.signature else {
            return Ok(Outcome::Settled);
        };
        info!(old_id = %candidate.id, %new_id, "resuming interrupted re-parenting");
        self.finish_reparent(&candidate.id, new_id, journal).await?;
        log.push(
            ReportEntry::document(ReportCode::ReparentLocal, &candidate.id)
                .with_message(format!("now {new_id}")),
        );
        Ok(Outcome::Synchronized {
            id: new_id.to_string(),
        })
    }

    /// Every step after the journal write. Safe to repeat.
    async fn finish_reparent(
        &self,
        old_id: &str,
        new_id: &str,
        journal: &SignatureRecord,
    ) -> ReplicateResult<()> {
        let local = &self.local;
        if let Some(doc) = local.get(old_id).await.optional()? {
            local.put(new_id, doc).await?;
            let names = local
                .all_attachments(old_id)
                .await
                .optional()?
                .unwrap_or_default();
            for name in names.into_keys() {
                let attachment = local.get_attachment(old_id, &name).await?;
                local.put_attachment(new_id, &name, attachment).await?;
            }
            local.remove(old_id).await.optional()?;
        }

        self.signatures
            .put(new_id, &SignatureRecord::new(journal.hash.as_str(), true))
            .await?;
        self.signatures.remove(old_id).await?;
        Ok(())
    }
}

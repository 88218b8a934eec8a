//! Candidate discovery.
//!
//! Both sides are listed with the replication filter and hashed; the
//! candidates are the union of both listings and of every signature, in id
//! order. An id whose copy or signature cannot be read stays a candidate,
//! marked unreadable, so only that id fails.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use docsync_codec::Document;
use docsync_storage::{Capacity, DocumentStorage, Filter, Query, StorageError, StorageResult};
use tracing::{debug, warn};

use crate::conflict::Side;
use crate::error::{ReplicateError, ReplicateResult, Store};
use crate::executor::OperationPool;
use crate::hasher::Hasher;
use crate::signature::{SignatureRecord, SignatureStore};

/// One id to reconcile, with what the scan saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Document id.
    pub id: String,
    /// Local hash, `None` when absent or filtered out.
    pub local: Option<String>,
    /// Remote hash, `None` when absent or filtered out.
    pub remote: Option<String>,
    /// Last synchronized state.
    pub signature: Option<SignatureRecord>,
    /// Why the scan could not read one of the three copies.
    pub unreadable: Option<String>,
}

impl Candidate {
    /// Signature hash, if any.
    pub fn signature_hash(&self) -> Option<&str> {
        self.signature.as_ref().map(|s| s.hash.as_str())
    }

    /// Current hash of one side.
    pub fn hash(&self, side: Side) -> Option<&str> {
        match side {
            Side::Local => self.local.as_deref(),
            Side::Remote => self.remote.as_deref(),
        }
    }

    /// Target of an interrupted re-parenting.
    pub fn pending_migration(&self) -> Option<&str> {
        self.signature.as_ref()?.migrated_to.as_deref()
    }
}

/// Lists stores and builds the candidate set.
pub(crate) struct Scanner<'a> {
    pub(crate) local: &'a Arc<dyn DocumentStorage>,
    pub(crate) remote: &'a Arc<dyn DocumentStorage>,
    pub(crate) signatures: &'a SignatureStore,
    pub(crate) hasher: &'a Hasher,
    pub(crate) filter: &'a Filter,
    pub(crate) pool: &'a OperationPool,
}

impl Scanner<'_> {
    /// Every candidate, in id order.
    pub(crate) async fn scan(&self) -> ReplicateResult<Vec<Candidate>> {
        let mut unreadable = BTreeMap::new();
        let local = self.hash_side(Store::Local, self.local, &mut unreadable).await?;
        let remote = self
            .hash_side(Store::Remote, self.remote, &mut unreadable)
            .await?;
        let signatures = self.signature_records(&mut unreadable).await?;

        // handled together with the id they migrate from
        let migrating: BTreeSet<&str> = signatures
            .values()
            .filter_map(|record| record.migrated_to.as_deref())
            .collect();

        let ids: BTreeSet<&String> = local
            .keys()
            .chain(remote.keys())
            .chain(signatures.keys())
            .chain(unreadable.keys())
            .collect();

        let candidates: Vec<Candidate> = ids
            .into_iter()
            .filter(|id| !migrating.contains(id.as_str()))
            .map(|id| Candidate {
                id: id.clone(),
                local: local.get(id).cloned(),
                remote: remote.get(id).cloned(),
                signature: signatures.get(id).cloned(),
                unreadable: unreadable.get(id).cloned(),
            })
            .collect();

        debug!(
            local = local.len(),
            remote = remote.len(),
            unreadable = unreadable.len(),
            candidates = candidates.len(),
            "scan complete"
        );
        Ok(candidates)
    }

    async fn hash_side(
        &self,
        store: Store,
        storage: &Arc<dyn DocumentStorage>,
        unreadable: &mut BTreeMap<String, String>,
    ) -> ReplicateResult<BTreeMap<String, String>> {
        let docs = list(store, storage, self.filter, self.hasher.select_fields(), self.pool).await?;
        let mut hashes = BTreeMap::new();
        for (id, doc) in docs {
            let hash = match doc {
                Ok(doc) => self.hasher.document_hash(&doc).map_err(ReplicateError::from),
                Err(e) => Err(ReplicateError::from(e)),
            };
            match hash {
                Ok(hash) => {
                    hashes.insert(id, hash);
                }
                Err(e) => mark_unreadable(unreadable, store, id, &e),
            }
        }
        Ok(hashes)
    }

    async fn signature_records(
        &self,
        unreadable: &mut BTreeMap<String, String>,
    ) -> ReplicateResult<BTreeMap<String, SignatureRecord>> {
        let docs = list(
            Store::Signature,
            self.signatures.storage(),
            &Filter::All,
            None,
            self.pool,
        )
        .await?;
        let mut records = BTreeMap::new();
        for (id, doc) in docs {
            match doc.and_then(|doc| SignatureRecord::from_document(&doc)) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => mark_unreadable(unreadable, Store::Signature, id, &e),
            }
        }
        Ok(records)
    }
}

fn mark_unreadable(
    unreadable: &mut BTreeMap<String, String>,
    store: Store,
    id: String,
    err: &impl std::fmt::Display,
) {
    warn!(%id, %store, error = %err, "cannot read listed document");
    unreadable
        .entry(id)
        .or_insert_with(|| format!("cannot read {store} copy: {err}"));
}

/// List `storage`, falling back on whatever capacities it lacks.
///
/// Without `Filter` everything is listed and the filter is applied here;
/// without `IncludeDocs` each row is fetched with `get`. `select` is only
/// pushed down when the backend evaluates the filter itself.
///
/// A row that vanished before its `get` is dropped; any other `get` failure
/// is kept next to its id. Only the listing itself fails the scan.
async fn list(
    store: Store,
    storage: &Arc<dyn DocumentStorage>,
    filter: &Filter,
    select: Option<&[String]>,
    pool: &OperationPool,
) -> ReplicateResult<Vec<(String, StorageResult<Document>)>> {
    let scan_error = |source| ReplicateError::Scan { store, source };
    if !storage.has_capacity(Capacity::List) {
        return Err(scan_error(StorageError::Unsupported(Capacity::List)));
    }

    let push_filter = filter.is_all() || storage.has_capacity(Capacity::Filter);
    let mut query = if push_filter {
        Query::filtered(filter.clone())
    } else {
        Query::all()
    };
    if let Some(fields) = select {
        if push_filter && storage.has_capacity(Capacity::Select) {
            query = query.with_select(fields.to_vec());
        }
    }

    let rows = storage.query(&query).await.map_err(scan_error)?;
    let fetched = pool
        .run_all(rows, |row| async move {
            let doc = match row.value {
                Some(doc) => Ok(doc),
                None => match storage.get(&row.id).await {
                    Err(e) if e.is_not_found() => return Ok(None),
                    fetched => fetched,
                },
            };
            Ok(Some((row.id, doc)))
        })
        .await?;

    Ok(fetched
        .into_iter()
        .flatten()
        .filter(|(_, doc)| match doc {
            Ok(doc) => push_filter || filter.matches(doc),
            Err(_) => true,
        })
        .collect())
}

//! Signature records: the last synchronized state of each document.

use std::collections::BTreeMap;
use std::sync::Arc;

use docsync_codec::{Document, Value};
use docsync_storage::{Attachment, DocumentStorage, OptionalExt, StorageError, StorageResult};

const HASH: &str = "hash";
const FROM_LOCAL: &str = "from_local";
const ATTACHMENT_HASH: &str = "attachment_hash";
const MIGRATED_TO: &str = "migrated_to";

/// Content type of attachment signature blobs.
pub const SIGNATURE_CONTENT_TYPE: &str = "application/cbor";

/// What a document looked like when it was last synchronized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Hash of the synchronized content.
    pub hash: String,
    /// Whether the content came from the local side.
    pub from_local: bool,
    /// Hash of the synchronized attachment set, once attachments were
    /// reconciled.
    pub attachment_hash: Option<String>,
    /// Id the document is being moved to. Only set while a re-parenting is
    /// in progress.
    pub migrated_to: Option<String>,
}

impl SignatureRecord {
    /// A plain record.
    pub fn new(hash: impl Into<String>, from_local: bool) -> Self {
        Self {
            hash: hash.into(),
            from_local,
            attachment_hash: None,
            migrated_to: None,
        }
    }

    /// Builder-style attachment hash.
    #[must_use]
    pub fn with_attachment_hash(mut self, hash: Option<String>) -> Self {
        self.attachment_hash = hash;
        self
    }

    /// Builder-style migration target.
    #[must_use]
    pub fn migrating_to(mut self, id: impl Into<String>) -> Self {
        self.migrated_to = Some(id.into());
        self
    }

    /// Stored form.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new()
            .with(HASH, self.hash.as_str())
            .with(FROM_LOCAL, self.from_local);
        if let Some(hash) = &self.attachment_hash {
            doc.insert(ATTACHMENT_HASH, hash.as_str());
        }
        if let Some(id) = &self.migrated_to {
            doc.insert(MIGRATED_TO, id.as_str());
        }
        doc
    }

    /// Parse the stored form.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDocument`] when `hash` is missing or a
    /// field has the wrong type.
    pub fn from_document(doc: &Document) -> StorageResult<Self> {
        let hash = doc
            .get(HASH)
            .and_then(Value::as_text)
            .ok_or_else(|| StorageError::InvalidDocument("signature without hash".into()))?;
        let from_local = match doc.get(FROM_LOCAL) {
            None => false,
            Some(value) => value.as_bool().ok_or_else(|| {
                StorageError::InvalidDocument(format!("{FROM_LOCAL} must be a boolean"))
            })?,
        };
        Ok(Self {
            hash: hash.to_string(),
            from_local,
            attachment_hash: optional_text(doc, ATTACHMENT_HASH)?,
            migrated_to: optional_text(doc, MIGRATED_TO)?,
        })
    }
}

fn optional_text(doc: &Document, field: &str) -> StorageResult<Option<String>> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.clone())),
        Some(other) => Err(StorageError::InvalidDocument(format!(
            "{field} must be text, found {}",
            other.kind()
        ))),
    }
}

/// Typed access to the signature storage.
///
/// Attachment signatures live as attachments of the document signature, so
/// removing a document signature removes them too.
#[derive(Clone)]
pub struct SignatureStore {
    storage: Arc<dyn DocumentStorage>,
}

impl SignatureStore {
    /// Wrap the signature backend.
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        Self { storage }
    }

    /// The underlying backend.
    pub fn storage(&self) -> &Arc<dyn DocumentStorage> {
        &self.storage
    }

    /// Signature of `id`, if one exists.
    pub async fn get(&self, id: &str) -> StorageResult<Option<SignatureRecord>> {
        match self.storage.get(id).await.optional()? {
            Some(doc) => SignatureRecord::from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    /// Write the signature of `id`, keeping its attachment signatures.
    pub async fn put(&self, id: &str, record: &SignatureRecord) -> StorageResult<()> {
        self.storage.put(id, record.to_document()).await
    }

    /// Drop the signature of `id` and its attachment signatures. Missing
    /// signatures are fine.
    pub async fn remove(&self, id: &str) -> StorageResult<()> {
        self.storage.remove(id).await.optional().map(|_| ())
    }

    /// Attachment signatures of `id`, by name.
    pub async fn attachments(&self, id: &str) -> StorageResult<BTreeMap<String, String>> {
        let Some(listing) = self.storage.all_attachments(id).await.optional()? else {
            return Ok(BTreeMap::new());
        };
        let mut hashes = BTreeMap::new();
        for name in listing.into_keys() {
            let blob = self.storage.get_attachment(id, &name).await?;
            let record = Document::from_cbor(&blob.data)?;
            let hash = record
                .get(HASH)
                .and_then(Value::as_text)
                .ok_or_else(|| {
                    StorageError::InvalidDocument(format!("attachment signature {name} without hash"))
                })?
                .to_string();
            hashes.insert(name, hash);
        }
        Ok(hashes)
    }

    /// Record the synchronized hash of one attachment.
    pub async fn put_attachment(&self, id: &str, name: &str, hash: &str) -> StorageResult<()> {
        let blob = Document::new().with(HASH, hash).to_cbor()?;
        self.storage
            .put_attachment(id, name, Attachment::new(blob, SIGNATURE_CONTENT_TYPE))
            .await
    }

    /// Forget one attachment signature. Missing ones are fine.
    pub async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.storage
            .remove_attachment(id, name)
            .await
            .optional()
            .map(|_| ())
    }
}

impl std::fmt::Debug for SignatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, SignatureStore) {
        let backend = Arc::new(MemoryStorage::new());
        let signatures = SignatureStore::new(backend.clone());
        (backend, signatures)
    }

    #[test]
    fn record_round_trips_through_document() {
        let record = SignatureRecord::new("abc", true)
            .with_attachment_hash(Some("def".into()))
            .migrating_to("new");
        let doc = record.to_document();
        assert_eq!(SignatureRecord::from_document(&doc).unwrap(), record);

        let plain = SignatureRecord::new("abc", false).to_document();
        assert!(!plain.contains(ATTACHMENT_HASH));
        assert!(!plain.contains(MIGRATED_TO));
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(SignatureRecord::from_document(&Document::new()).is_err());
        let bad = Document::new().with(HASH, "x").with(FROM_LOCAL, "yes");
        assert!(SignatureRecord::from_document(&bad).is_err());
    }

    #[tokio::test]
    async fn missing_signature_is_none() {
        let (_, signatures) = store();
        assert_eq!(signatures.get("nope").await.unwrap(), None);
        signatures.remove("nope").await.unwrap();
        assert!(signatures.attachments("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_a_signature_drops_attachment_signatures() {
        let (backend, signatures) = store();
        signatures
            .put("a", &SignatureRecord::new("h", true))
            .await
            .unwrap();
        signatures.put_attachment("a", "img", "h1").await.unwrap();
        signatures.put_attachment("a", "txt", "h2").await.unwrap();

        let hashes = signatures.attachments("a").await.unwrap();
        assert_eq!(hashes.get("img").map(String::as_str), Some("h1"));
        assert_eq!(hashes.len(), 2);

        signatures.remove_attachment("a", "txt").await.unwrap();
        signatures.remove_attachment("a", "txt").await.unwrap();
        assert_eq!(signatures.attachments("a").await.unwrap().len(), 1);

        signatures.remove("a").await.unwrap();
        assert!(backend.is_empty());
        assert!(signatures.attachments("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewriting_a_signature_keeps_attachment_signatures() {
        let (_, signatures) = store();
        signatures
            .put("a", &SignatureRecord::new("h", true))
            .await
            .unwrap();
        signatures.put_attachment("a", "img", "h1").await.unwrap();
        signatures
            .put("a", &SignatureRecord::new("h2", false))
            .await
            .unwrap();
        assert_eq!(signatures.attachments("a").await.unwrap().len(), 1);
        assert_eq!(signatures.get("a").await.unwrap().unwrap().hash, "h2");
    }
}

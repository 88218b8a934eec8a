//! The storage capability interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use docsync_codec::Document;

use crate::attachment::{Attachment, AttachmentInfo};
use crate::capability::{Capabilities, Capacity};
use crate::error::{StorageError, StorageResult};
use crate::query::{Query, QueryRow};

/// An asynchronous document store.
///
/// Documents are addressed by opaque string ids. Each document may own
/// named binary attachments; removing a document removes its attachments.
///
/// Every call may suspend. Backends must be `Send + Sync` so a single
/// instance can serve concurrent operations.
///
/// # Invariants
///
/// - `get` after a successful `put` returns the written document
/// - a missing document or attachment is reported as
///   [`StorageError::NotFound`] / [`StorageError::AttachmentNotFound`]
/// - [`capabilities`](Self::capabilities) never changes over the lifetime
///   of an instance
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Optional capacities this backend offers.
    fn capabilities(&self) -> Capabilities;

    /// Whether a single capacity is offered.
    fn has_capacity(&self, capacity: Capacity) -> bool {
        self.capabilities().supports(capacity)
    }

    /// Fetch a document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no document has this id.
    async fn get(&self, id: &str) -> StorageResult<Document>;

    /// Create or replace a document under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UpdateConflict`] if the backend detected a
    /// concurrent write, or any backend failure.
    async fn put(&self, id: &str, doc: Document) -> StorageResult<()>;

    /// Create a document under a backend-assigned id and return that id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] unless the backend offers
    /// [`Capacity::Post`].
    async fn post(&self, doc: Document) -> StorageResult<String> {
        let _ = doc;
        Err(StorageError::Unsupported(Capacity::Post))
    }

    /// Delete a document and all of its attachments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no document has this id.
    async fn remove(&self, id: &str) -> StorageResult<()>;

    /// List documents.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] when the query needs a capacity
    /// the backend lacks ([`Capacity::List`], [`Capacity::Filter`] for a
    /// non-trivial filter, [`Capacity::Select`] for a projection).
    async fn query(&self, query: &Query) -> StorageResult<Vec<QueryRow>>;

    /// List the attachments of a document, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the document does not exist.
    async fn all_attachments(&self, id: &str) -> StorageResult<BTreeMap<String, AttachmentInfo>>;

    /// Fetch one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AttachmentNotFound`] if the document or the
    /// attachment does not exist.
    async fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment>;

    /// Create or replace an attachment of an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the document does not exist.
    async fn put_attachment(&self, id: &str, name: &str, attachment: Attachment)
        -> StorageResult<()>;

    /// Delete one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AttachmentNotFound`] if it does not exist.
    async fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()>;

    /// Bring this store (and any stores it wraps) into a consistent state.
    ///
    /// Plain backends have nothing to do. Composite stores override this.
    ///
    /// # Errors
    ///
    /// Backend specific.
    async fn repair(&self) -> StorageResult<()> {
        Ok(())
    }
}

//! Error types for storage operations.

use std::io;

use docsync_codec::CodecError;
use thiserror::Error;

use crate::capability::Capacity;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The document does not exist. This is the normal answer to an
    /// existence check, not a failure.
    #[error("document {id} not found")]
    NotFound {
        /// Requested document id.
        id: String,
    },

    /// The attachment (or its owning document) does not exist.
    #[error("attachment {name} of document {id} not found")]
    AttachmentNotFound {
        /// Owning document id.
        id: String,
        /// Attachment name.
        name: String,
    },

    /// The backend rejected a write because the stored version moved on.
    #[error("update conflict on document {id}")]
    UpdateConflict {
        /// Document id.
        id: String,
    },

    /// The backend lacks a capacity the caller relied on.
    #[error("storage does not support {0}")]
    Unsupported(Capacity),

    /// A stored document could not be interpreted.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// No backend type with this name is registered.
    #[error("unknown storage type: {0}")]
    UnknownType(String),

    /// A storage description is missing a parameter or has a bad one.
    #[error("invalid storage description: {0}")]
    InvalidDescription(String),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Create a document not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an attachment not-found error.
    pub fn attachment_not_found(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AttachmentNotFound {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Create an update conflict error.
    pub fn update_conflict(id: impl Into<String>) -> Self {
        Self::UpdateConflict { id: id.into() }
    }

    /// Create a generic backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether this error only reports a missing document or attachment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::AttachmentNotFound { .. })
    }

    /// Whether this error reports a concurrent modification.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UpdateConflict { .. })
    }
}

/// Turn a not-found error into `None`.
pub trait OptionalExt<T> {
    /// Map `Err(NotFound)` to `Ok(None)`; keep every other error.
    ///
    /// # Errors
    ///
    /// Returns any error that is not a not-found report.
    fn optional(self) -> StorageResult<Option<T>>;
}

impl<T> OptionalExt<T> for StorageResult<T> {
    fn optional(self) -> StorageResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_benign() {
        assert!(StorageError::not_found("a").is_not_found());
        assert!(StorageError::attachment_not_found("a", "b").is_not_found());
        assert!(!StorageError::backend("down").is_not_found());
        assert!(StorageError::update_conflict("a").is_conflict());
    }

    #[test]
    fn optional_swallows_only_not_found() {
        let found: StorageResult<u8> = Ok(1);
        assert_eq!(found.optional().unwrap(), Some(1));
        let missing: StorageResult<u8> = Err(StorageError::not_found("x"));
        assert_eq!(missing.optional().unwrap(), None);
        let broken: StorageResult<u8> = Err(StorageError::backend("boom"));
        assert!(broken.optional().is_err());
    }

    #[test]
    fn display_names_the_capacity() {
        let err = StorageError::Unsupported(Capacity::Post);
        assert_eq!(err.to_string(), "storage does not support post");
    }
}

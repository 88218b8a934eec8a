//! Binary attachments owned by documents.

use bytes::Bytes;
use docsync_codec::content_digest;
use serde::{Deserialize, Serialize};

/// Content type used when none is given.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A named blob attached to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Blob content.
    pub data: Bytes,
    /// MIME type.
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Attachment {
    /// Create an attachment.
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Create an attachment with the default content type.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(data, DEFAULT_CONTENT_TYPE)
    }

    /// Blob length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SHA-256 hex digest of the content.
    pub fn digest(&self) -> String {
        content_digest(&self.data)
    }

    /// Listing entry for this attachment.
    pub fn info(&self, with_digest: bool) -> AttachmentInfo {
        AttachmentInfo {
            content_type: self.content_type.clone(),
            length: self.data.len() as u64,
            digest: with_digest.then(|| self.digest()),
        }
    }
}

/// Metadata returned when listing a document's attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// MIME type.
    pub content_type: String,
    /// Blob length in bytes.
    pub length: u64,
    /// SHA-256 hex digest, when the backend reports one.
    pub digest: Option<String>,
}

//! Content hashing for change detection.

use std::collections::BTreeMap;

use docsync_codec::{content_digest, value_digest, CodecResult, Document, Value};

/// Computes the hashes compared during a pass.
///
/// Equal logical content on either side always hashes identically, because
/// hashes are taken over canonical encodings.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    fields: Option<Vec<String>>,
}

impl Hasher {
    /// Hash whole documents, or only `fields` when given.
    pub fn new(fields: Option<Vec<String>>) -> Self {
        Self { fields }
    }

    /// Fields hashes are restricted to, if any.
    pub fn select_fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Hash of a document.
    ///
    /// # Errors
    ///
    /// Propagates encoder failures.
    pub fn document_hash(&self, doc: &Document) -> CodecResult<String> {
        match &self.fields {
            Some(fields) => value_digest(&doc.restrict(fields).to_value()),
            None => value_digest(&doc.to_value()),
        }
    }

    /// Hash of an attachment blob. Matches the digest backends report.
    pub fn attachment_hash(&self, data: &[u8]) -> String {
        content_digest(data)
    }

    /// Hash of a whole attachment set, given each attachment's hash.
    ///
    /// # Errors
    ///
    /// Propagates encoder failures.
    pub fn attachment_set_hash(&self, hashes: &BTreeMap<String, String>) -> CodecResult<String> {
        let pairs = hashes
            .iter()
            .map(|(name, hash)| {
                Value::Array(vec![Value::Text(name.clone()), Value::Text(hash.clone())])
            })
            .collect();
        value_digest(&Value::Array(pairs))
    }
}

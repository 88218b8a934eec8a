//! Backend capability flags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single optional capacity a backend may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// Enumerate document ids.
    List,
    /// Evaluate a [`crate::Filter`] server-side.
    Filter,
    /// Project query rows onto selected fields.
    Select,
    /// Return document bodies with query rows.
    IncludeDocs,
    /// Create documents with backend-assigned ids.
    Post,
    /// Report content digests in attachment listings.
    AttachmentDigest,
}

impl Capacity {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Capacity::List => "list",
            Capacity::Filter => "filter",
            Capacity::Select => "select",
            Capacity::IncludeDocs => "include_docs",
            Capacity::Post => "post",
            Capacity::AttachmentDigest => "attachment_digest",
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of capacities a backend offers, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// See [`Capacity::List`].
    pub list: bool,
    /// See [`Capacity::Filter`].
    pub filter: bool,
    /// See [`Capacity::Select`].
    pub select: bool,
    /// See [`Capacity::IncludeDocs`].
    pub include_docs: bool,
    /// See [`Capacity::Post`].
    pub post: bool,
    /// See [`Capacity::AttachmentDigest`].
    pub attachment_digest: bool,
}

impl Capabilities {
    /// Every capacity enabled.
    pub const fn all() -> Self {
        Self {
            list: true,
            filter: true,
            select: true,
            include_docs: true,
            post: true,
            attachment_digest: true,
        }
    }

    /// Plain key/value access only.
    pub const fn none() -> Self {
        Self {
            list: false,
            filter: false,
            select: false,
            include_docs: false,
            post: false,
            attachment_digest: false,
        }
    }

    /// Whether `capacity` is offered.
    pub fn supports(&self, capacity: Capacity) -> bool {
        match capacity {
            Capacity::List => self.list,
            Capacity::Filter => self.filter,
            Capacity::Select => self.select,
            Capacity::IncludeDocs => self.include_docs,
            Capacity::Post => self.post,
            Capacity::AttachmentDigest => self.attachment_digest,
        }
    }

    /// Return a copy with `capacity` switched on or off.
    #[must_use]
    pub fn set(mut self, capacity: Capacity, enabled: bool) -> Self {
        let flag = match capacity {
            Capacity::List => &mut self.list,
            Capacity::Filter => &mut self.filter,
            Capacity::Select => &mut self.select,
            Capacity::IncludeDocs => &mut self.include_docs,
            Capacity::Post => &mut self.post,
            Capacity::AttachmentDigest => &mut self.attachment_digest,
        };
        *flag = enabled;
        self
    }

    /// Return a copy without `capacity`.
    #[must_use]
    pub fn without(self, capacity: Capacity) -> Self {
        self.set(capacity, false)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

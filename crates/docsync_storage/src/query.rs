//! Query descriptions and a minimal structured filter.
//!
//! Backends with [`Capacity::Filter`](crate::Capacity::Filter) evaluate the
//! filter themselves; callers holding full documents can evaluate it locally
//! with [`Filter::matches`].

use docsync_codec::{Document, Value};
use serde::{Deserialize, Serialize};

/// A document predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Field equals the given value.
    Equals {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field is present.
    Exists {
        /// Field name.
        field: String,
    },
    /// Every sub-filter matches.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality filter shorthand.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether this filter accepts every document.
    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Evaluate against a full document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Equals { field, value } => doc.get(field) == Some(value),
            Filter::Exists { field } => doc.contains(field),
            Filter::And(parts) => parts.iter().all(|f| f.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }
}

/// A listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Which documents to return.
    #[serde(default)]
    pub filter: Filter,
    /// Fields to project returned documents onto. `None` returns whole
    /// documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
}

impl Query {
    /// Every document, whole.
    pub fn all() -> Self {
        Self::default()
    }

    /// Documents matching `filter`, whole.
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            select: None,
        }
    }

    /// Restrict returned documents to `fields`.
    #[must_use]
    pub fn with_select(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }
}

/// One result of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRow {
    /// Document id.
    pub id: String,
    /// Document body, present when the backend includes documents.
    pub value: Option<Document>,
}

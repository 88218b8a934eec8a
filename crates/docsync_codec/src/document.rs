//! JSON-like documents keyed by field name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decoder::from_cbor;
use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// A document: an ordered map from field name to [`Value`].
///
/// Serializes as a plain JSON object. Field order never affects equality,
/// encoding or digests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Get a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Whether the field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Project the document onto `fields`. Missing fields are omitted.
    pub fn restrict<S: AsRef<str>>(&self, fields: &[S]) -> Document {
        fields
            .iter()
            .filter_map(|f| {
                let name = f.as_ref();
                self.0.get(name).map(|v| (name.to_string(), v.clone()))
            })
            .collect()
    }

    /// Convert to a canonical map [`Value`].
    pub fn to_value(&self) -> Value {
        Value::map(
            self.0
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect(),
        )
    }

    /// Build a document from a map value with text keys.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedShape`] if the value is not a map or
    /// a key is not text.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        let Value::Map(pairs) = value else {
            return Err(CodecError::UnexpectedShape {
                expected: "map",
                found: value.kind(),
            });
        };
        let mut fields = BTreeMap::new();
        for (key, val) in pairs {
            match key {
                Value::Text(name) => {
                    fields.insert(name, val);
                }
                other => {
                    return Err(CodecError::UnexpectedShape {
                        expected: "text key",
                        found: other.kind(),
                    })
                }
            }
        }
        Ok(Self(fields))
    }

    /// Canonical CBOR encoding of the document.
    ///
    /// # Errors
    ///
    /// Propagates encoder failures.
    pub fn to_cbor(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(&self.to_value())
    }

    /// Decode a document from canonical CBOR.
    ///
    /// # Errors
    ///
    /// Fails on invalid input or when the top-level value is not a map.
    pub fn from_cbor(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_value(from_cbor(bytes)?)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_keeps_only_named_fields() {
        let doc = Document::new()
            .with("title", "foo")
            .with("body", "bar")
            .with("rev", 3);
        let restricted = doc.restrict(&["title", "missing"]);
        assert_eq!(restricted, Document::new().with("title", "foo"));
    }

    #[test]
    fn cbor_is_independent_of_insertion_order() {
        let mut a = Document::new();
        a.insert("z", 1);
        a.insert("a", 2);
        let b = Document::new().with("a", 2).with("z", 1);
        assert_eq!(a.to_cbor().unwrap(), b.to_cbor().unwrap());
        assert_eq!(Document::from_cbor(&a.to_cbor().unwrap()).unwrap(), b);
    }

    #[test]
    fn from_value_requires_text_keyed_map() {
        assert!(matches!(
            Document::from_value(Value::Integer(1)),
            Err(CodecError::UnexpectedShape { expected: "map", .. })
        ));
        let bad = Value::Map(vec![(Value::Integer(1), Value::Null)]);
        assert!(Document::from_value(bad).is_err());
    }

    #[test]
    fn json_round_trip() {
        let doc: Document =
            serde_json::from_str(r#"{"title": "x", "tags": ["a", "b"], "n": -2}"#).unwrap();
        assert_eq!(doc.get("n"), Some(&Value::Integer(-2)));
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"n":-2,"tags":["a","b"],"title":"x"}"#);
    }
}

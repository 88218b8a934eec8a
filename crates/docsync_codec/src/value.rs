//! Dynamic value type shared by documents and signatures.

use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoder::CanonicalEncoder;

/// A dynamic document value.
///
/// Floats are deliberately absent: every value must have exactly one
/// canonical encoding, so two stores holding the same logical content
/// always produce the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value pairs. Use [`Value::map`] to build one in canonical order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value whose keys are sorted canonically.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Value::Map(pairs)
    }

    /// Compare two values by their canonical encodings
    /// (shorter encoding first, then bytewise).
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let left = CanonicalEncoder::encode_unchecked(self);
        let right = CanonicalEncoder::encode_unchecked(other);
        left.len().cmp(&right.len()).then_with(|| left.cmp(&right))
    }

    /// Short name of this value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as text, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a text key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a float-free document value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {v} is out of range")))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Value, E> {
        Err(E::custom(crate::CodecError::FloatForbidden))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((k, v)) = access.next_entry::<Value, Value>()? {
            pairs.push((k, v));
        }
        Ok(Value::map(pairs))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_follow_canonical_order() {
        let map = Value::map(vec![
            (Value::from("title"), Value::Integer(1)),
            (Value::from("b"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(3)),
        ]);
        let keys: Vec<_> = match &map {
            Value::Map(pairs) => pairs.iter().filter_map(|(k, _)| k.as_text()).collect(),
            _ => panic!("expected map"),
        };
        assert_eq!(keys, vec!["a", "b", "title"]);
    }

    #[test]
    fn integers_sort_before_text() {
        let mut values = vec![Value::from("a"), Value::Integer(-1), Value::Integer(7)];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(
            values,
            vec![Value::Integer(7), Value::Integer(-1), Value::from("a")]
        );
    }

    #[test]
    fn get_looks_up_text_keys() {
        let map = Value::map(vec![(Value::from("name"), Value::from("Ada"))]);
        assert_eq!(map.get("name"), Some(&Value::from("Ada")));
        assert_eq!(map.get("missing"), None);
        assert_eq!(Value::Null.get("name"), None);
    }

    #[test]
    fn json_objects_deserialize_sorted() {
        let value: Value = serde_json::from_str(r#"{"z": 1, "a": [true, null, "x"]}"#).unwrap();
        assert_eq!(
            value,
            Value::map(vec![
                (
                    Value::from("a"),
                    Value::Array(vec![Value::Bool(true), Value::Null, Value::from("x")])
                ),
                (Value::from("z"), Value::Integer(1)),
            ])
        );
    }

    #[test]
    fn json_floats_are_rejected() {
        let err = serde_json::from_str::<Value>(r#"{"price": 1.5}"#).unwrap_err();
        assert!(err.to_string().contains("float"));
    }

    #[test]
    fn serializes_to_plain_json() {
        let value = Value::map(vec![(Value::from("n"), Value::Integer(3))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"n":3}"#);
    }
}

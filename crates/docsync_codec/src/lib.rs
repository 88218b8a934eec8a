//! # docsync codec
//!
//! Document values and their canonical encoding.
//!
//! Replication compares documents held by independent stores, so every
//! logical document must map to exactly one byte string and one digest.
//! This crate provides:
//!
//! - [`Value`] and [`Document`], a float-free JSON-like data model
//! - a canonical CBOR encoder and validating decoder
//! - SHA-256 digests over raw bytes and over canonical encodings
//!
//! ## Canonical rules
//!
//! - Map keys are sorted by encoded form (shorter first, then bytewise)
//! - Integers and lengths use the shortest encoding
//! - No floats, no indefinite-length items, no tags
//!
//! ## Usage
//!
//! ```
//! use docsync_codec::{value_digest, Document};
//!
//! let a = Document::new().with("title", "notes").with("rev", 2);
//! let b = Document::new().with("rev", 2).with("title", "notes");
//! assert_eq!(
//!     value_digest(&a.to_value()).unwrap(),
//!     value_digest(&b.to_value()).unwrap()
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod digest;
mod document;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use digest::{content_digest, value_digest, DIGEST_HEX_LEN};
pub use document::Document;
pub use encoder::{to_canonical_cbor, CanonicalEncoder, MAX_NESTING_DEPTH};
pub use error::{CodecError, CodecResult};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-z]{0,8}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ]
    }

    fn nested() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(|m| {
                    Value::map(m.into_iter().map(|(k, v)| (Value::Text(k), v)).collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in nested()) {
            let bytes = to_canonical_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }

        #[test]
        fn reversed_maps_share_a_digest(pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)) {
            let forward: Vec<_> = pairs.iter().map(|(k, v)| (Value::from(k.as_str()), Value::Integer(*v))).collect();
            let mut backward = forward.clone();
            backward.reverse();
            prop_assert_eq!(
                value_digest(&Value::Map(forward)).unwrap(),
                value_digest(&Value::Map(backward)).unwrap()
            );
        }
    }
}

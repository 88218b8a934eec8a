//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Deepest nesting the encoder accepts before giving up.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Encode a value to canonical CBOR bytes.
///
/// Output follows RFC 8949 §4.2.1: shortest-form integers and lengths,
/// definite lengths only, and map entries ordered by their encoded keys
/// (shorter first, then bytewise). Two maps holding the same entries in
/// different orders encode identically.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] when the value nests deeper than
/// [`MAX_NESTING_DEPTH`].
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
    depth: usize,
    limit: Option<usize>,
}

impl CanonicalEncoder {
    /// Create an encoder with the default nesting limit.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            depth: 0,
            limit: Some(MAX_NESTING_DEPTH),
        }
    }

    /// Encode without a nesting limit. Only used for key ordering, where the
    /// value has already been produced in memory.
    pub(crate) fn encode_unchecked(value: &Value) -> Vec<u8> {
        let mut encoder = Self::default();
        // No limit configured, so encoding cannot fail.
        let _ = encoder.encode(value);
        encoder.buffer
    }

    /// Append the encoding of `value`.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.write_integer(*n),
            Value::Bytes(b) => {
                self.write_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.write_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.enter()?;
                self.write_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
                self.depth -= 1;
            }
            Value::Map(pairs) => {
                self.enter()?;
                self.write_map(pairs)?;
                self.depth -= 1;
            }
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn enter(&mut self) -> CodecResult<()> {
        self.depth += 1;
        match self.limit {
            Some(limit) if self.depth > limit => Err(CodecError::encoding_failed(format!(
                "nesting deeper than {limit} levels"
            ))),
            _ => Ok(()),
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(0, n as u64);
        } else {
            // Major type 1 carries -1 - n, which is non-negative for any negative n.
            self.write_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        match arg {
            0..=23 => self.buffer.push(mt | arg as u8),
            24..=0xff => {
                self.buffer.push(mt | 24);
                self.buffer.push(arg as u8);
            }
            0x100..=0xffff => {
                self.buffer.push(mt | 25);
                self.buffer.extend_from_slice(&(arg as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buffer.push(mt | 26);
                self.buffer.extend_from_slice(&(arg as u32).to_be_bytes());
            }
            _ => {
                self.buffer.push(mt | 27);
                self.buffer.extend_from_slice(&arg.to_be_bytes());
            }
        }
    }

    fn write_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let mut key_encoder = CanonicalEncoder {
                buffer: Vec::new(),
                depth: self.depth,
                limit: self.limit,
            };
            key_encoder.encode(key)?;
            entries.push((key_encoder.buffer, value));
        }
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.write_head(5, entries.len() as u64);
        for (key, value) in entries {
            self.buffer.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_values() {
        assert_eq!(to_canonical_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)).unwrap(), vec![0xf4]);
    }

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::Integer(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Integer(65_536)).unwrap(),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(to_canonical_cbor(&Value::Integer(-100)).unwrap(), vec![0x38, 99]);
    }

    #[test]
    fn extreme_integers() {
        let min = to_canonical_cbor(&Value::Integer(i64::MIN)).unwrap();
        assert_eq!(min[0], 0x3b);
        assert_eq!(&min[1..], &(i64::MAX as u64).to_be_bytes());
        let max = to_canonical_cbor(&Value::Integer(i64::MAX)).unwrap();
        assert_eq!(max[0], 0x1b);
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(
            to_canonical_cbor(&Value::from("hi")).unwrap(),
            vec![0x62, b'h', b'i']
        );
        assert_eq!(
            to_canonical_cbor(&Value::Bytes(vec![9, 8])).unwrap(),
            vec![0x42, 9, 8]
        );
    }

    #[test]
    fn map_order_does_not_change_encoding() {
        let forward = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let backward = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("bb"), Value::Integer(2)),
        ]);
        let bytes = to_canonical_cbor(&forward).unwrap();
        assert_eq!(bytes, to_canonical_cbor(&backward).unwrap());
        assert_eq!(bytes, vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut value = Value::Null;
        for _ in 0..=MAX_NESTING_DEPTH {
            value = Value::Array(vec![value]);
        }
        assert!(matches!(
            to_canonical_cbor(&value),
            Err(CodecError::EncodingFailed { .. })
        ));
    }
}

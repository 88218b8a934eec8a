//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Largest element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 1 << 24;

/// Largest byte or text string length accepted.
const MAX_BYTES_LENGTH: u64 = 1 << 28;

/// Decode a single value from canonical CBOR bytes.
///
/// # Errors
///
/// Fails on truncated input, trailing bytes, floats, indefinite lengths,
/// non-shortest encodings and out-of-order map keys.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure("trailing bytes after value"));
    }
    Ok(value)
}

/// A decoder that accepts only canonical CBOR.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.read_arg(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }
            1 => {
                let n = self.read_arg(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }
            2 => {
                let len = self.read_len(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_slice(len)?.to_vec()))
            }
            3 => {
                let len = self.read_len(info, MAX_BYTES_LENGTH)?;
                let text = std::str::from_utf8(self.read_slice(len)?)
                    .map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.read_len(info, MAX_CONTAINER_ELEMENTS)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(Value::Array(items))
            }
            5 => self.decode_map(info),
            6 => Err(CodecError::invalid_structure("tagged values are not used")),
            _ => self.decode_simple(info),
        }
    }

    fn decode_map(&mut self, info: u8) -> CodecResult<Value> {
        let data = self.data;
        let len = self.read_len(info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(1024));
        let mut previous: Option<&'a [u8]> = None;

        for _ in 0..len {
            let start = self.pos;
            let key = self.decode()?;
            let encoded = &data[start..self.pos];
            if let Some(prev) = previous {
                let in_order = prev.len() < encoded.len()
                    || (prev.len() == encoded.len() && prev < encoded);
                if !in_order {
                    return Err(CodecError::invalid_structure(
                        "map keys not in canonical order",
                    ));
                }
            }
            previous = Some(encoded);
            let value = self.decode()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25..=27 => Err(CodecError::FloatForbidden),
            31 => Err(CodecError::IndefiniteLengthForbidden),
            other => Err(CodecError::invalid_structure(format!(
                "unsupported simple value {other}"
            ))),
        }
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_len(&mut self, info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.read_arg(info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn read_arg(&mut self, info: u8) -> CodecResult<u64> {
        let (value, minimum) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_slice(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_slice(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_slice(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                (u64::from_be_bytes(buf), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < minimum {
            return Err(CodecError::invalid_structure(
                "argument not in shortest form",
            ));
        }
        Ok(value)
    }
}

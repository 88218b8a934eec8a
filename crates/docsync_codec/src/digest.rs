//! SHA-256 content digests, rendered as lowercase hex.

use sha2::{Digest, Sha256};

use crate::encoder::to_canonical_cbor;
use crate::error::CodecResult;
use crate::value::Value;

/// Length of a hex digest string.
pub const DIGEST_HEX_LEN: usize = 64;

/// Digest raw bytes.
pub fn content_digest(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

/// Digest the canonical encoding of a value.
///
/// # Errors
///
/// Propagates encoder failures.
pub fn value_digest(value: &Value) -> CodecResult<String> {
    Ok(content_digest(&to_canonical_cbor(value)?))
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[usize::from(b >> 4)] as char);
        out.push(HEX[usize::from(b & 0x0f)] as char);
    }
    out
}

//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding, decoding or converting values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Float values are forbidden in canonical encoding.
    #[error("float values are forbidden in documents")]
    FloatForbidden,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input is not canonical or not structurally valid.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A length prefix exceeds what the decoder accepts.
    #[error("declared size {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// Size announced by the input.
        claimed: u64,
        /// Largest accepted size.
        max_allowed: u64,
    },

    /// The value has the wrong shape for the requested conversion.
    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        /// Shape the caller asked for.
        expected: &'static str,
        /// Shape that was present.
        found: &'static str,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

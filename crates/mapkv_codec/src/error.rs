//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An object encoder failed to encode its value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Stored bytes could not be decoded.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A payload had the wrong length for its fixed-width type.
    #[error("invalid length for {type_name}: expected {expected}, got {actual}")]
    InvalidLength {
        /// Name of the value type.
        type_name: &'static str,
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        actual: usize,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Unknown value type code.
    #[error("unknown value type code: {code}")]
    UnknownType {
        /// The offending type code.
        code: u8,
    },

    /// An encoder tag is empty or too long.
    #[error("invalid encoder tag {tag:?}")]
    InvalidTag {
        /// The offending tag.
        tag: String,
    },

    /// Two encoders were registered under the same tag.
    #[error("duplicate encoder tag {tag:?}")]
    DuplicateTag {
        /// The tag registered twice.
        tag: String,
    },

    /// A decoded object did not have the type the caller asked for.
    #[error("object with tag {tag:?} is not of the requested type")]
    TypeMismatch {
        /// Tag of the stored object.
        tag: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid tag error.
    pub fn invalid_tag(tag: impl Into<String>) -> Self {
        Self::InvalidTag { tag: tag.into() }
    }

    /// Create a duplicate tag error.
    pub fn duplicate_tag(tag: impl Into<String>) -> Self {
        Self::DuplicateTag { tag: tag.into() }
    }
}

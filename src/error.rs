//! Error types for the card codec.
//!
//! Structural errors describe a container that cannot be walked safely.
//! Format errors describe a payload that was located but could not be decoded.
//! "No character data" is not an error: readers return `Ok(None)` for it.

use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors produced by the PNG/JPEG codec and the card schema mapper.
#[derive(Debug, Error)]
pub enum Error {
    /// The buffer does not start with the PNG signature or the JPEG SOI marker.
    #[error("invalid container signature")]
    InvalidSignature,

    /// A chunk or segment claims more bytes than remain in the buffer.
    #[error("truncated container at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The rebuilt PNG would not end with an `IEND` chunk.
    #[error("PNG does not end with an IEND chunk")]
    MissingIend,

    /// A payload is too large for the length field of one chunk or segment.
    #[error("payload of {len} bytes does not fit in a single chunk or segment")]
    SegmentTooLarge { len: usize },

    /// A `tEXt` keyword has characters that ISO-8859-1 cannot hold.
    #[error("text keyword {0:?} cannot be stored as Latin-1")]
    InvalidKeyword(String),

    /// The JPEG marker stream could not be walked or re-assembled.
    #[error("malformed JPEG: {0}")]
    Jpeg(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("invalid card JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// `true` for errors about the container layout rather than its payload.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::Truncated { .. }
                | Self::MissingIend
                | Self::SegmentTooLarge { .. }
                | Self::Jpeg(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

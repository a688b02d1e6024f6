//! Codec error types.

use thiserror::Error;

/// Errors from key derivation, transform lookup and frame coding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Sequence number does not fit in 4 bits.
    #[error("invalid sequence number: {value} (must be 0..=15)")]
    InvalidSequenceNumber {
        /// The rejected value.
        value: u8,
    },

    /// Frame is too short to contain a nonce.
    #[error("short frame: {len} bytes, need at least {min}")]
    ShortFrame {
        /// Actual frame length.
        len: usize,
        /// Minimum acceptable length.
        min: usize,
    },

    /// AEAD tag verification failed. No plaintext is released.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Authenticated payload carried no sequence byte.
    #[error("empty payload")]
    EmptyPayload,

    /// Extraction instruction points past the end of the plaintext.
    #[error("extraction out of range: needs {needed} bytes, plaintext has {len}")]
    ExtractionOutOfRange {
        /// Number of bytes the instruction requires.
        needed: usize,
        /// Plaintext length.
        len: usize,
    },

    /// Key table must contain at least one key.
    #[error("invalid key table size: {size}")]
    InvalidKeyTableSize {
        /// The rejected size.
        size: u32,
    },

    /// Numeric transform id outside 1..=8.
    #[error("unknown transform id: {id}")]
    UnknownTransform {
        /// The rejected id.
        id: u8,
    },

    /// The AEAD primitive refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,

    /// A MAC or cipher rejected the supplied key material.
    #[error("invalid key length")]
    InvalidKeyLength,
}

impl CodecError {
    /// Returns true if this error means the peers no longer agree on state.
    ///
    /// Caller-side mistakes (bad sequence number, short plaintext) are not
    /// fatal: they are rejected before any state is touched.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ShortFrame { .. } | Self::AuthenticationFailure | Self::EmptyPayload => true,

            Self::InvalidSequenceNumber { .. }
            | Self::ExtractionOutOfRange { .. }
            | Self::InvalidKeyTableSize { .. }
            | Self::UnknownTransform { .. }
            | Self::EncryptionFailed
            | Self::InvalidKeyLength => false,
        }
    }
}

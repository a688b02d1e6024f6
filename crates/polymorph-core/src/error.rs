//! Session error types.

use polymorph_crypto::{CodecError, SequenceNumber};
use thiserror::Error;

use crate::{env::EntropyError, session::SessionState};

/// Errors from session operations.
///
/// A non-fatal error aborts only the operation that produced it; session state
/// is left exactly as it was before the call. A fatal error closes the session
/// and erases its key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Codec or key derivation failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No nonce could be drawn, so nothing was encrypted.
    #[error("{0}")]
    Entropy(#[from] EntropyError),

    /// Peer handshake record could not be parsed.
    #[error("malformed handshake: {reason}")]
    MalformedHandshake {
        /// Description of the parse failure.
        reason: String,
    },

    /// Authenticated frame used a different scheme than expected.
    ///
    /// Both ends derive the sequence number from the transcript, so a
    /// mismatch means a message was lost, duplicated or reordered.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence number this side expected.
        expected: SequenceNumber,
        /// Sequence number found in the frame.
        actual: SequenceNumber,
    },

    /// Plaintext is reserved for close signalling.
    #[error("payload is reserved for session close")]
    ReservedPayload,

    /// Operation not allowed in the current state.
    #[error("invalid state: {operation} not allowed while {state:?}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },
}

impl SessionError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors mean the two ends no longer share state, or that this
    /// end can no longer encrypt safely. There is no resynchronization: the
    /// session erases itself and the only recovery is a new handshake.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SequenceMismatch { .. }
            | Self::MalformedHandshake { .. }
            | Self::Entropy(_) => true,

            Self::Codec(e) => e.is_fatal(),

            Self::ReservedPayload | Self::InvalidState { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_is_fatal() {
        let err = SessionError::from(CodecError::AuthenticationFailure);
        assert!(err.is_fatal());
    }

    #[test]
    fn short_plaintext_is_transient() {
        let err = SessionError::from(CodecError::ExtractionOutOfRange { needed: 3, len: 1 });
        assert!(!err.is_fatal());
    }

    #[test]
    fn invalid_state_is_transient() {
        let err = SessionError::InvalidState { operation: "send", state: SessionState::Closed };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "invalid state: send not allowed while Closed");
    }

    #[test]
    fn entropy_failure_is_fatal() {
        let err = SessionError::from(EntropyError { reason: "pool closed".to_string() });
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "entropy source unavailable: pool closed");
    }

    #[test]
    fn error_display() {
        let err = SessionError::SequenceMismatch {
            expected: SequenceNumber::from_low_nibble(3),
            actual: SequenceNumber::from_low_nibble(0xb),
        };
        assert_eq!(err.to_string(), "sequence mismatch: expected 3, got B");
    }
}

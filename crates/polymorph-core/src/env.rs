//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples session logic from system resources
//! (time, randomness). This enables:
//!
//! - Deterministic tests: a seeded RNG makes every nonce, and therefore every
//!   frame, reproducible.
//!
//! - Production runtime: the server crate plugs in OS entropy without any
//!   change to the session logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::Instant;

use polymorph_crypto::NONCE_SIZE;
use thiserror::Error;

/// The randomness source could not produce bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entropy source unavailable: {reason}")]
pub struct EntropyError {
    /// What the source reported.
    pub reason: String,
}

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production.
/// 3. Nonce safety: `try_random_bytes()` reports failure instead of filling
///    the buffer with predictable bytes. Every frame nonce is drawn from it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use the OS entropy pool
    /// (`getrandom`), never a non-cryptographic generator.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fills the provided buffer with random bytes, reporting failure.
    ///
    /// Implementations whose source can fail MUST override this; the default
    /// treats `random_bytes()` as infallible. Nonces are only ever drawn
    /// through this method.
    fn try_random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        self.random_bytes(buffer);
        Ok(())
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a fresh AEAD nonce.
    ///
    /// # Errors
    ///
    /// Returns `EntropyError` if the source failed; no fallback value is
    /// ever substituted.
    fn nonce(&self) -> Result<[u8; NONCE_SIZE], EntropyError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.try_random_bytes(&mut nonce)?;
        Ok(nonce)
    }
}

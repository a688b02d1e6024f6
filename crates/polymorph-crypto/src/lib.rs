//! Polymorph Cryptographic Primitives
//!
//! This crate provides the cryptographic building blocks for the Polymorph
//! protocol: the shared key schedule, the sixteen polymorphic transform
//! schemes and the authenticated frame codec.
//!
//! # Design
//!
//! All functions in this crate are pure - they have no side effects and
//! produce deterministic outputs given the same inputs. Nonces required for
//! encryption must be provided by the caller, enabling:
//!
//! - Deterministic testing with seeded RNG
//! - Sans-IO architecture compatibility
//! - No coupling to application-level abstractions
//!
//! # Layers
//!
//! ```text
//! plaintext ──► scheme[seq].transforms ──► seq ‖ processed ──► AES-128-GCM ──► nonce ‖ ct ‖ tag
//! ```
//!
//! # Security Properties
//!
//! - Key agreement without key transport: both peers derive the same
//!   [`KeyTable`] from exchanged primes and seeds
//! - Integrity: decoding fails closed on any tag mismatch
//! - Erasure: key tables and expanded keys are zeroized when dropped
//!
//! The 64-bit keys are widened to 128 bits by duplication for compatibility
//! with existing peers, so the effective key space is 64 bits.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod keygen;
pub mod scheme;
pub mod transform;

pub use codec::{
    Decoded, MIN_FRAME_SIZE, NONCE_SIZE, TAG_SIZE, decode, encode, expand_key,
    extract_next_sequence,
};
pub use error::CodecError;
pub use keygen::{
    FINGERPRINT_SIZE, KeyTable, fg_generation, fm_mutation, fs_scramble, generate_key_table,
};
pub use scheme::{Extraction, SCHEMES, Scheme, SequenceNumber};
pub use transform::{Transform, apply, undo};

//! Frame codec.
//!
//! Wire format:
//!
//! ```text
//! ┌──────────────┬───────────────────────────────────────────┬──────────┐
//! │ nonce (12)   │ AES-128-GCM( seq ‖ transform(plaintext) ) │ tag (16) │
//! └──────────────┴───────────────────────────────────────────┴──────────┘
//! ```
//!
//! The sequence number travels inside the ciphertext, in the low nibble of
//! the first payload byte, so it is authenticated together with the message.
//!
//! # Security
//!
//! The 64-bit session key is widened to the 128-bit AES key by writing it
//! twice. This keeps frames compatible with existing peers but caps the
//! effective key space at 64 bits.

use aes_gcm::{
    Aes128Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

use crate::{
    error::CodecError,
    scheme::{Extraction, SequenceNumber},
    transform::{apply, undo},
};

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Smallest well-formed frame: nonce, sequence byte and tag.
pub const MIN_FRAME_SIZE: usize = NONCE_SIZE + 1 + TAG_SIZE;

/// Expanded AES key size in bytes.
const AES_KEY_SIZE: usize = 16;

/// A successfully authenticated and decoded frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Recovered plaintext.
    pub plaintext: Vec<u8>,
    /// Sequence number the sender used.
    pub seq: SequenceNumber,
    /// Instruction for reading the next sequence number out of `plaintext`.
    pub next: Extraction,
}

impl std::fmt::Debug for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoded")
            .field("plaintext", &format!("<redacted {} bytes>", self.plaintext.len()))
            .field("seq", &self.seq)
            .field("next", &self.next)
            .finish()
    }
}

/// Widen a 64-bit key to 128 bits by duplication.
pub fn expand_key(key: u64) -> Zeroizing<[u8; AES_KEY_SIZE]> {
    let half = key.to_be_bytes();
    let mut expanded = Zeroizing::new([0u8; AES_KEY_SIZE]);
    expanded[..8].copy_from_slice(&half);
    expanded[8..].copy_from_slice(&half);
    expanded
}

fn cipher(key: u64) -> Aes128Gcm {
    let expanded = expand_key(key);
    Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(expanded.as_slice()))
}

/// Encode `plaintext` under scheme `seq` and `key`.
///
/// The caller supplies a fresh random `nonce` for every frame.
///
/// # Errors
///
/// - `CodecError::InvalidSequenceNumber` if `seq > 15`
/// - `CodecError::EncryptionFailed` if the AEAD refuses the input
pub fn encode(
    plaintext: &[u8],
    seq: u8,
    key: u64,
    nonce: [u8; NONCE_SIZE],
) -> Result<Vec<u8>, CodecError> {
    let seq = SequenceNumber::try_from(seq)?;

    let mut payload = Zeroizing::new(Vec::with_capacity(plaintext.len() + 1));
    payload.push(seq.value());
    payload.extend_from_slice(&apply(plaintext, seq.scheme().transforms));

    let ciphertext = cipher(key)
        .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
        .map_err(|_| CodecError::EncryptionFailed)?;

    let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Authenticate and decode `frame` with `key`.
///
/// Never returns plaintext from a frame whose tag does not verify.
///
/// # Errors
///
/// - `CodecError::ShortFrame` if the frame cannot hold a nonce
/// - `CodecError::AuthenticationFailure` on tag mismatch
/// - `CodecError::EmptyPayload` if the authenticated payload has no sequence
///   byte
pub fn decode(frame: &[u8], key: u64) -> Result<Decoded, CodecError> {
    if frame.len() < NONCE_SIZE {
        return Err(CodecError::ShortFrame { len: frame.len(), min: NONCE_SIZE });
    }
    let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);

    let payload = Zeroizing::new(
        cipher(key)
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::AuthenticationFailure)?,
    );

    let (&first, processed) = payload.split_first().ok_or(CodecError::EmptyPayload)?;
    let seq = SequenceNumber::from_low_nibble(first);
    let scheme = seq.scheme();

    Ok(Decoded { plaintext: undo(processed, scheme.transforms), seq, next: scheme.next })
}

/// Read the next sequence number out of `plaintext` with `instruction`.
///
/// # Errors
///
/// Returns `CodecError::ExtractionOutOfRange` if the instruction reads past
/// the end of the plaintext.
pub fn extract_next_sequence(
    plaintext: &[u8],
    instruction: Extraction,
) -> Result<SequenceNumber, CodecError> {
    instruction.extract(plaintext)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    const KEY: u64 = 0x0123_4567_89ab_cdef;
    const NONCE: [u8; NONCE_SIZE] = hex!("000102030405060708090a0b");

    #[test]
    fn key_is_duplicated() {
        let expanded = expand_key(KEY);
        assert_eq!(*expanded, hex!("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn encode_matches_known_frames() {
        let cases: [(u8, &[u8]); 3] = [
            (
                0,
                &hex!(
                    "000102030405060708090a0b57938c09df99cfa09558eeab3406d8295420fc8790121c3e629f20ae"
                ),
            ),
            (
                3,
                &hex!(
                    "000102030405060708090a0b545538e73169dba0657a00153e3be497666ee6e77f689173f141969f"
                ),
            ),
            (
                15,
                &hex!(
                    "000102030405060708090a0b589edbbc820270cbd621e3de73d8d427f4c2fa98b3c4bd61f9713935"
                ),
            ),
        ];

        for (seq, expected) in cases {
            let frame = encode(b"hello world", seq, KEY, NONCE).unwrap();
            assert_eq!(frame, expected, "seq {seq}");
        }
    }

    #[test]
    fn frame_length_is_nonce_seq_plaintext_tag() {
        let frame = encode(b"hello world", 7, KEY, NONCE).unwrap();
        assert_eq!(frame.len(), NONCE_SIZE + 1 + 11 + TAG_SIZE);
        assert_eq!(&frame[..NONCE_SIZE], &NONCE);
    }

    #[test]
    fn empty_plaintext_frame_is_minimal() {
        let frame = encode(b"", 0, KEY, NONCE).unwrap();
        assert_eq!(frame.len(), MIN_FRAME_SIZE);
    }

    #[test]
    fn invalid_sequence_number_rejected() {
        let result = encode(b"hello", 16, KEY, NONCE);
        assert_eq!(result, Err(CodecError::InvalidSequenceNumber { value: 16 }));
    }

    #[test]
    fn short_frame_rejected() {
        let result = decode(&[0u8; 5], KEY);
        assert_eq!(result, Err(CodecError::ShortFrame { len: 5, min: NONCE_SIZE }));
    }

    #[test]
    fn nonce_only_frame_fails_authentication() {
        let result = decode(&NONCE, KEY);
        assert_eq!(result, Err(CodecError::AuthenticationFailure));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let frame = encode(b"hello world", 2, KEY, NONCE).unwrap();
        assert_eq!(decode(&frame, KEY ^ 1), Err(CodecError::AuthenticationFailure));
    }

    #[test]
    fn decode_reports_scheme_instruction() {
        let frame = encode(b"hello world", 1, KEY, NONCE).unwrap();
        let decoded = decode(&frame, KEY).unwrap();
        assert_eq!(decoded.seq.value(), 1);
        assert_eq!(decoded.next, Extraction::LastByte);
        assert_eq!(decoded.plaintext, b"hello world");
    }

    #[test]
    fn authenticated_empty_payload_rejected() {
        let ciphertext = cipher(KEY).encrypt(Nonce::from_slice(&NONCE), &[][..]).unwrap();
        let mut frame = NONCE.to_vec();
        frame.extend_from_slice(&ciphertext);

        assert_eq!(decode(&frame, KEY), Err(CodecError::EmptyPayload));
        assert!(CodecError::EmptyPayload.is_fatal());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let frame = encode(&[], 9, KEY, NONCE).unwrap();
        let decoded = decode(&frame, KEY).unwrap();
        assert!(decoded.plaintext.is_empty());
        assert_eq!(decoded.seq.value(), 9);
    }

    #[test]
    fn extract_first_byte_low_nibble() {
        let seq = extract_next_sequence(&[0x37, 0x00], Extraction::ByteIndex(0)).unwrap();
        assert_eq!(seq.value(), 0x7);
    }

    #[test]
    fn debug_redacts_plaintext() {
        let frame = encode(b"top secret", 0, KEY, NONCE).unwrap();
        let decoded = decode(&frame, KEY).unwrap();
        assert!(!format!("{decoded:?}").contains("top secret"));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            plaintext in prop::collection::vec(any::<u8>(), 0..512),
            seq in 0u8..=15,
            key: u64,
            nonce: [u8; NONCE_SIZE],
        ) {
            let frame = encode(&plaintext, seq, key, nonce).unwrap();
            let decoded = decode(&frame, key).unwrap();
            prop_assert_eq!(decoded.plaintext, plaintext);
            prop_assert_eq!(decoded.seq.value(), seq);
            prop_assert_eq!(decoded.next, decoded.seq.scheme().next);
        }

        #[test]
        fn any_bit_flip_fails_closed(
            plaintext in prop::collection::vec(any::<u8>(), 1..64),
            seq in 0u8..=15,
            bit in any::<prop::sample::Index>(),
        ) {
            let mut frame = encode(&plaintext, seq, KEY, NONCE).unwrap();
            let position = bit.index(frame.len() * 8);
            frame[position / 8] ^= 1 << (position % 8);

            prop_assert_eq!(decode(&frame, KEY), Err(CodecError::AuthenticationFailure));
        }
    }
}

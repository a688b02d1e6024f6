//! Shared key schedule.
//!
//! Two peers that agree on `(P, Q, S, N)` derive the same table of 64-bit keys
//! without ever transmitting key material. Each table entry is produced by
//! three chained functions:
//!
//! ```text
//! seed_0 = S
//! embryo_i = fs(P, seed_i)              HMAC-SHA256, first 8 bytes
//! key_i    = fg(embryo_i, Q, i)         SHA-256(embryo ‖ Q ‖ i), first 8 bytes
//! seed_i+1 = fm(seed_i, Q, i)           SHA-256(rotl(seed ^ (Q+i)) ‖ Q ‖ i)
//! ```
//!
//! # Invariants
//!
//! - Determinism: identical arguments produce bit-identical tables
//! - Order sensitivity: `(P, Q)` and `(Q, P)` produce different tables, so
//!   peers must agree on which prime is `P`

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// Ordered table of 64-bit session keys.
///
/// Entries are zeroized when the table is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyTable {
    keys: Vec<u64>,
}

impl KeyTable {
    /// Number of keys in the table. Never zero.
    pub fn len(&self) -> u32 {
        // Construction bounds the length by a u32 counter.
        u32::try_from(self.keys.len()).unwrap_or(u32::MAX)
    }

    /// Always false; a table holds at least one key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`, if in range.
    pub fn get(&self, index: u32) -> Option<u64> {
        self.keys.get(index as usize).copied()
    }

    /// All keys in derivation order.
    pub fn as_slice(&self) -> &[u64] {
        &self.keys
    }

    /// Short identifier for the key at `index` that does not reveal it.
    ///
    /// First [`FINGERPRINT_SIZE`] bytes of SHA-256 over the big-endian key.
    /// Both peers compute the same fingerprints for the same table.
    pub fn fingerprint(&self, index: u32) -> Option<[u8; FINGERPRINT_SIZE]> {
        let key = self.get(index)?;
        let digest = Sha256::digest(key.to_be_bytes());

        let mut fingerprint = [0u8; FINGERPRINT_SIZE];
        fingerprint.copy_from_slice(&digest[..FINGERPRINT_SIZE]);
        Some(fingerprint)
    }
}

/// Length of a key fingerprint in bytes.
pub const FINGERPRINT_SIZE: usize = 4;

impl std::fmt::Debug for KeyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTable")
            .field("keys", &format!("<redacted {} keys>", self.keys.len()))
            .finish()
    }
}

/// Derive the embryo for one table entry.
///
/// HMAC-SHA256 keyed with the minimal big-endian encoding of `p`, over the
/// minimal big-endian encoding of `seed`.
pub fn fs_scramble(p: u64, seed: u64) -> Result<u64, CodecError> {
    let key = minimal_be_bytes(p);
    let msg = minimal_be_bytes(seed);

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| CodecError::InvalidKeyLength)?;
    mac.update(&msg);

    Ok(leading_u64(&mac.finalize().into_bytes()))
}

/// Derive table entry `counter` from its embryo and the peer prime.
pub fn fg_generation(embryo: u64, q: u64, counter: u32) -> u64 {
    let digest = Sha256::new()
        .chain_update(embryo.to_be_bytes())
        .chain_update(q.to_be_bytes())
        .chain_update(counter.to_be_bytes())
        .finalize();

    leading_u64(&digest)
}

/// Mutate the seed for the next iteration.
pub fn fm_mutation(seed: u64, q: u64, counter: u32) -> u64 {
    let mixed = seed ^ q.wrapping_add(u64::from(counter));
    let shift = match counter & 63 {
        0 => 1,
        n => n,
    };
    let rotated = mixed.rotate_left(shift);

    let digest = Sha256::new()
        .chain_update(rotated.to_be_bytes())
        .chain_update(q.to_be_bytes())
        .chain_update(counter.to_be_bytes())
        .finalize();

    leading_u64(&digest)
}

/// Build an `n`-entry key table from shared parameters.
///
/// # Errors
///
/// Returns `CodecError::InvalidKeyTableSize` if `n` is zero.
pub fn generate_key_table(p: u64, q: u64, s: u64, n: u32) -> Result<KeyTable, CodecError> {
    if n == 0 {
        return Err(CodecError::InvalidKeyTableSize { size: n });
    }

    let mut keys = Vec::with_capacity(n as usize);
    let mut seed = s;

    for counter in 0..n {
        let embryo = fs_scramble(p, seed)?;
        keys.push(fg_generation(embryo, q, counter));
        seed = fm_mutation(seed, q, counter);
    }

    seed.zeroize();
    Ok(KeyTable { keys })
}

/// Big-endian bytes without leading zeros; zero encodes as a single byte.
fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    let start = skip.min(bytes.len() - 1);
    bytes[start..].to_vec()
}

fn leading_u64(digest: &[u8]) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn minimal_encoding_strips_leading_zeros() {
        assert_eq!(minimal_be_bytes(0), vec![0x00]);
        assert_eq!(minimal_be_bytes(42), vec![0x2a]);
        assert_eq!(minimal_be_bytes(0x0100), vec![0x01, 0x00]);
        assert_eq!(minimal_be_bytes(u64::MAX), vec![0xff; 8]);
    }

    #[test]
    fn first_entry_matches_known_values() {
        let embryo = fs_scramble(101, 42).unwrap();
        assert_eq!(embryo, 0xe9e4_b20f_d3f2_522b);
        assert_eq!(fg_generation(embryo, 103, 0), 0x5c3b_1787_65ea_5c7a);
        assert_eq!(fm_mutation(42, 103, 0), 0xeec2_545c_e76a_0927);
    }

    #[test]
    fn zero_key_and_seed_are_encoded_as_one_byte() {
        assert_eq!(fs_scramble(0, 0).unwrap(), 0x6620_b31f_2924_b8c0);
    }

    #[test]
    fn table_matches_known_vector() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();
        assert_eq!(
            table.as_slice(),
            &[
                0x5c3b_1787_65ea_5c7a,
                0x655e_0aee_dcfc_6ee6,
                0xefcb_b565_a6a1_b310,
                0x4785_85dd_c810_3c62,
            ]
        );
    }

    #[test]
    fn swapping_primes_changes_table() {
        let forward = generate_key_table(101, 103, 42, 4).unwrap();
        let swapped = generate_key_table(103, 101, 42, 4).unwrap();
        assert_eq!(swapped.get(0), Some(0x85ac_5508_8af8_1c91));
        assert_ne!(forward, swapped);
    }

    #[test]
    fn zero_size_rejected() {
        let result = generate_key_table(101, 103, 42, 0);
        assert_eq!(result, Err(CodecError::InvalidKeyTableSize { size: 0 }));
    }

    #[test]
    fn fingerprints_match_known_values() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();
        assert_eq!(table.fingerprint(0), Some([0x28, 0x31, 0x22, 0x8f]));
        assert_eq!(table.fingerprint(1), Some([0x5d, 0x4d, 0x0f, 0x89]));
        assert_eq!(table.fingerprint(4), None);
    }

    #[test]
    fn debug_redacts_keys() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();
        let debug = format!("{table:?}");
        assert!(debug.contains("<redacted 4 keys>"));
        assert!(!debug.contains("5c3b"));
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(p: u64, q: u64, s: u64, n in 1u32..32) {
            let a = generate_key_table(p, q, s, n).unwrap();
            let b = generate_key_table(p, q, s, n).unwrap();
            prop_assert_eq!(a.len(), n);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn longer_table_extends_shorter(p: u64, q: u64, s: u64, n in 1u32..16) {
            let short = generate_key_table(p, q, s, n).unwrap();
            let long = generate_key_table(p, q, s, n + 4).unwrap();
            prop_assert_eq!(short.as_slice(), &long.as_slice()[..n as usize]);
        }
    }
}

//! First-contact handshake.
//!
//! Each side sends one cleartext record before any encrypted traffic:
//!
//! ```text
//! <prime>,<seed>        decimal ASCII, e.g. "101,42"
//! ```
//!
//! From its own record and the peer's, each side builds [`SharedParams`] and
//! derives the key table. Malformed records are rejected before any key
//! material exists.

use polymorph_crypto::{KeyTable, generate_key_table};

use crate::{
    entropy::{NodeParams, Role},
    error::SessionError,
};

/// Number of keys in a table unless configured otherwise.
pub const DEFAULT_TABLE_SIZE: u32 = 4;

/// Longest possible record: two 20-digit `u64` values and a comma.
pub const MAX_RECORD_LEN: usize = 41;

/// The cleartext parameter record exchanged on first contact.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRecord {
    /// Sender's probable prime.
    pub prime: u64,
    /// Sender's seed.
    pub seed: u64,
}

impl HandshakeRecord {
    /// Record announcing `params`.
    pub fn from_params(params: &NodeParams) -> Self {
        Self { prime: params.prime, seed: params.seed }
    }

    /// Serialize as `<prime>,<seed>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{},{}", self.prime, self.seed).into_bytes()
    }

    /// Parse a received record.
    ///
    /// Surrounding whitespace is ignored; anything other than exactly two
    /// comma-separated decimal `u64` values is rejected.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedHandshake` describing the first
    /// problem found.
    pub fn parse(bytes: &[u8]) -> Result<Self, SessionError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| SessionError::MalformedHandshake { reason: "not UTF-8".to_string() })?;

        let mut fields = text.trim().split(',');
        let (Some(prime), Some(seed), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(SessionError::MalformedHandshake {
                reason: "expected exactly two comma-separated fields".to_string(),
            });
        };

        Ok(Self { prime: parse_field("prime", prime)?, seed: parse_field("seed", seed)? })
    }
}

fn parse_field(name: &str, field: &str) -> Result<u64, SessionError> {
    field.trim().parse::<u64>().map_err(|e| SessionError::MalformedHandshake {
        reason: format!("invalid {name} {field:?}: {e}"),
    })
}

impl std::fmt::Debug for HandshakeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeRecord")
            .field("prime", &self.prime)
            .field("seed", &"<redacted>")
            .finish()
    }
}

/// Parameters both sides agree on after the handshake.
///
/// Immutable once built.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SharedParams {
    /// This node's identifier.
    pub local_id: u32,
    /// Local prime.
    pub p: u64,
    /// Peer prime.
    pub q: u64,
    /// Shared seed: local seed XOR peer seed.
    pub s: u64,
    /// Key table size.
    pub n: u32,
}

impl SharedParams {
    /// Combine local parameters with the peer's record.
    pub fn new(local: &NodeParams, peer: &HandshakeRecord, n: u32) -> Self {
        Self {
            local_id: local.node_id,
            p: local.prime,
            q: peer.prime,
            s: local.seed ^ peer.seed,
            n,
        }
    }

    /// Derive the key table as seen from `role`.
    ///
    /// The initiator's prime is always passed as `P`, so both ends derive
    /// the same table even though each holds the primes the other way round.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Codec` with `InvalidKeyTableSize` if `n` is 0.
    pub fn derive_key_table(&self, role: Role) -> Result<KeyTable, SessionError> {
        let (p, q) = match role {
            Role::Initiator => (self.p, self.q),
            Role::Responder => (self.q, self.p),
        };
        Ok(generate_key_table(p, q, self.s, self.n)?)
    }
}

impl std::fmt::Debug for SharedParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedParams")
            .field("local_id", &format_args!("{:08x}", self.local_id))
            .field("p", &self.p)
            .field("q", &self.q)
            .field("s", &"<redacted>")
            .field("n", &self.n)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn node(node_id: u32, prime: u64, seed: u64) -> NodeParams {
        NodeParams { node_id, prime, seed }
    }

    #[test]
    fn record_format() {
        let record = HandshakeRecord { prime: 101, seed: 42 };
        assert_eq!(record.to_bytes(), b"101,42");
    }

    #[test]
    fn widest_record_fits_limit() {
        let record = HandshakeRecord { prime: u64::MAX, seed: u64::MAX };
        assert_eq!(record.to_bytes().len(), MAX_RECORD_LEN);
    }

    #[test]
    fn record_parse_roundtrip() {
        let record = HandshakeRecord { prime: u64::MAX, seed: 0 };
        assert_eq!(HandshakeRecord::parse(&record.to_bytes()).unwrap(), record);
    }

    #[test]
    fn record_parse_tolerates_whitespace() {
        let record = HandshakeRecord::parse(b" 101 , 42\n").unwrap();
        assert_eq!(record, HandshakeRecord { prime: 101, seed: 42 });
    }

    #[test]
    fn record_parse_rejects_malformed() {
        let inputs: [&[u8]; 7] = [
            b"",
            b"101",
            b"101,42,7",
            b"abc,42",
            b"101,-1",
            b"101,18446744073709551616",
            b"\xff\xfe",
        ];

        for input in inputs {
            let result = HandshakeRecord::parse(input);
            assert!(
                matches!(result, Err(SessionError::MalformedHandshake { .. })),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn shared_seed_is_xor() {
        let params = SharedParams::new(
            &node(1, 101, 0b1100),
            &HandshakeRecord { prime: 103, seed: 0b1010 },
            4,
        );
        assert_eq!(params.s, 0b0110);
        assert_eq!((params.p, params.q), (101, 103));
    }

    #[test]
    fn both_roles_derive_same_table() {
        let client = node(1, 101, 40);
        let server = node(2, 103, 2);

        let client_view = SharedParams::new(&client, &HandshakeRecord::from_params(&server), 4);
        let server_view = SharedParams::new(&server, &HandshakeRecord::from_params(&client), 4);

        let client_table = client_view.derive_key_table(Role::Initiator).unwrap();
        let server_table = server_view.derive_key_table(Role::Responder).unwrap();

        assert_eq!(client_table, server_table);
        // 40 ^ 2 == 42: matches the reference vector for P=101, Q=103, S=42.
        assert_eq!(client_table.get(0), Some(0x5c3b_1787_65ea_5c7a));
    }

    #[test]
    fn zero_table_size_rejected() {
        let params =
            SharedParams::new(&node(1, 101, 1), &HandshakeRecord { prime: 103, seed: 2 }, 0);
        assert!(matches!(
            params.derive_key_table(Role::Initiator),
            Err(SessionError::Codec(polymorph_crypto::CodecError::InvalidKeyTableSize { size: 0 }))
        ));
    }
}

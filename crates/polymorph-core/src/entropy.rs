//! Per-node parameters and their source.
//!
//! Each node contributes a probable prime and a random seed to the handshake.
//! Where those values come from is pluggable: [`EntropySource`] is the seam,
//! [`EnvEntropy`] the default implementation built on an [`Environment`].

use crate::{env::Environment, prime};

/// Which end of the connection a node plays.
///
/// The initiator's prime is always `P` in key derivation and the responder's
/// is always `Q`, so both ends derive the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Opened the connection (client).
    Initiator,
    /// Accepted the connection (server).
    Responder,
}

impl Role {
    /// Short label for logs.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Initiator => "client",
            Self::Responder => "server",
        }
    }
}

/// Locally generated values one node brings to a handshake.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NodeParams {
    /// Node identifier, used for logging only.
    pub node_id: u32,
    /// Probable 64-bit prime.
    pub prime: u64,
    /// 64-bit seed; combined with the peer's seed by XOR.
    pub seed: u64,
}

impl std::fmt::Debug for NodeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeParams")
            .field("node_id", &format_args!("{:08x}", self.node_id))
            .field("prime", &self.prime)
            .field("seed", &"<redacted>")
            .finish()
    }
}

/// Supplies node parameters for a given role.
pub trait EntropySource {
    /// Generate fresh parameters for one connection.
    fn node_params(&self, role: Role) -> NodeParams;
}

/// Entropy source drawing from an [`Environment`]'s RNG.
///
/// Node ids and seeds have their top bit forced so they always use the full
/// width. Primes are the first probable prime at or above a random odd
/// 64-bit start with the top bit set.
#[derive(Debug, Clone)]
pub struct EnvEntropy<E: Environment> {
    env: E,
}

impl<E: Environment> EnvEntropy<E> {
    /// Wrap an environment.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    fn full_width_u64(&self) -> u64 {
        self.env.random_u64() | (1 << 63)
    }
}

impl<E: Environment> EntropySource for EnvEntropy<E> {
    fn node_params(&self, role: Role) -> NodeParams {
        let mut id_bytes = [0u8; 4];
        self.env.random_bytes(&mut id_bytes);
        let node_id = u32::from_be_bytes(id_bytes) | (1 << 31);
        let seed = self.full_width_u64();
        let prime = prime::next_prime_u64(self.full_width_u64() | 1);

        tracing::debug!(
            role = role.tag(),
            node_id = format_args!("{node_id:08x}"),
            "generated node parameters"
        );

        NodeParams { node_id, prime, seed }
    }
}

//! Polymorph production runtime.
//!
//! This crate provides the TCP server and client using:
//! - Tokio for async runtime
//! - Length-prefixed framing over TCP
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! polymorph-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ EnvEntropy         (node id, seed and prime per connection)
//!   ├─ FrameTransport     (u32 length prefix framing)
//!   └─ Connection         (drives one PeerSession)
//! ```
//!
//! Every accepted connection runs in its own task and exclusively owns its
//! session; sessions share nothing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod system_env;
pub mod transport;

use std::net::SocketAddr;

pub use connection::{Connection, Received};
pub use error::ServerError;
use polymorph_core::{
    EntropySource, EnvEntropy, MAX_RECORD_LEN, MIN_FRAME_SIZE, PeerSession, Role, SessionConfig,
};
pub use system_env::SystemEnv;
use tokio::net::{TcpListener, TcpStream};
pub use transport::{DEFAULT_MAX_FRAME_SIZE, FrameTransport};

/// Prefix the server puts in front of every echoed message.
pub const ECHO_PREFIX: &[u8] = b"echo: ";

/// Default address for both server and client.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:5000";

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:5000")
    pub bind_address: String,
    /// Session configuration; must match the clients'
    pub session: SessionConfig,
    /// Largest frame body accepted
    pub max_frame_size: usize,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_ADDRESS.to_string(),
            session: SessionConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address
    pub server_address: String,
    /// Session configuration; must match the server's
    pub session: SessionConfig,
    /// Largest frame body accepted
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_ADDRESS.to_string(),
            session: SessionConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Smallest usable frame limit: every handshake record and every encrypted
/// frame must fit.
pub const MIN_MAX_FRAME_SIZE: usize =
    if MAX_RECORD_LEN > MIN_FRAME_SIZE { MAX_RECORD_LEN } else { MIN_FRAME_SIZE };

fn validate(session: SessionConfig, max_frame_size: usize) -> Result<(), ServerError> {
    if session.table_size == 0 {
        return Err(ServerError::Config("table size must be at least 1".to_string()));
    }
    if max_frame_size < MIN_MAX_FRAME_SIZE {
        return Err(ServerError::Config(format!(
            "max frame size {max_frame_size} is below the minimum {MIN_MAX_FRAME_SIZE}"
        )));
    }
    Ok(())
}

/// Production Polymorph echo server.
pub struct Server {
    listener: TcpListener,
    config: ServerRuntimeConfig,
    env: SystemEnv,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - Binding to the address fails
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        validate(config.session, config.max_frame_size)?;
        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { listener, config, env: SystemEnv::new() })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections until the task is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.local_addr()?);

        let entropy = EnvEntropy::new(self.env.clone());

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let session = PeerSession::new(
                        self.env.clone(),
                        Role::Responder,
                        entropy.node_params(Role::Responder),
                        self.config.session,
                    );
                    let connection = Connection::new(
                        FrameTransport::new(stream, self.config.max_frame_size),
                        session,
                    );

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(connection, peer).await {
                            tracing::error!("Connection error from {}: {}", peer, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Serve one client: handshake, echo every message, acknowledge the close.
async fn handle_connection(
    mut connection: Connection<TcpStream, SystemEnv>,
    peer: SocketAddr,
) -> Result<(), ServerError> {
    tracing::debug!("New connection: {}", peer);
    connection.handshake().await?;

    while let Some(received) = connection.recv().await? {
        match received {
            Received::Message(message) => {
                tracing::debug!(%peer, len = message.len(), "message received");
                let mut reply = ECHO_PREFIX.to_vec();
                reply.extend_from_slice(&message);
                connection.send(&reply).await?;
            },
            Received::Closed(reason) => {
                tracing::info!(%peer, ?reason, "client closed session");
                return Ok(());
            },
        }
    }

    tracing::info!(%peer, "connection dropped without close");
    Ok(())
}

/// Connect to a server and complete the handshake.
///
/// # Errors
///
/// Returns error if the configuration is invalid, the connection fails, or
/// the handshake is rejected.
pub async fn connect(
    config: &ClientConfig,
) -> Result<Connection<TcpStream, SystemEnv>, ServerError> {
    validate(config.session, config.max_frame_size)?;

    let env = SystemEnv::new();
    let params = EnvEntropy::new(env.clone()).node_params(Role::Initiator);
    let stream = TcpStream::connect(&config.server_address).await?;

    let session = PeerSession::new(env, Role::Initiator, params, config.session);
    let mut connection =
        Connection::new(FrameTransport::new(stream, config.max_frame_size), session);
    connection.handshake().await?;

    tracing::info!("Connected to {}", config.server_address);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_limit_fits_handshake_and_frames() {
        assert_eq!(MIN_MAX_FRAME_SIZE, 41);
        assert!(validate(SessionConfig::default(), MIN_MAX_FRAME_SIZE).is_ok());
        assert!(validate(SessionConfig::default(), DEFAULT_MAX_FRAME_SIZE).is_ok());
    }

    #[test]
    fn undersized_frame_limit_rejected() {
        for limit in [0, 1, MIN_FRAME_SIZE - 1, MIN_FRAME_SIZE, MIN_MAX_FRAME_SIZE - 1] {
            let result = validate(SessionConfig::default(), limit);
            assert!(matches!(result, Err(ServerError::Config(_))), "accepted {limit}");
        }
    }

    #[test]
    fn empty_key_table_rejected() {
        let result = validate(SessionConfig { table_size: 0 }, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}

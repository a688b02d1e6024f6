//! Per-connection driver.
//!
//! A [`Connection`] owns one [`PeerSession`] and the framed stream it talks
//! over. It feeds transport input to the session as events and executes the
//! returned actions; all protocol decisions stay in the session.
//!
//! ```text
//! FrameTransport ──read_frame──► SessionEvent ──► PeerSession::handle
//!       ▲                                               │
//!       └──────────write_frame◄── SessionAction ◄───────┘
//! ```

use polymorph_core::{
    CloseReason, Environment, PeerSession, Role, SessionAction, SessionEvent, SessionState,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{error::ServerError, transport::FrameTransport};

/// What a received frame amounted to for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// The peer sent a message.
    Message(Vec<u8>),
    /// The session finished.
    Closed(CloseReason),
}

/// One peer session bound to one stream.
pub struct Connection<S, E: Environment> {
    transport: FrameTransport<S>,
    session: PeerSession<E>,
}

impl<S, E> Connection<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
{
    /// Bind a fresh session to a framed stream.
    pub fn new(transport: FrameTransport<S>, session: PeerSession<E>) -> Self {
        Self { transport, session }
    }

    /// The session driven by this connection.
    pub fn session(&self) -> &PeerSession<E> {
        &self.session
    }

    /// Exchange handshake records and derive the key table.
    ///
    /// The initiator announces first; the responder answers on receipt.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the stream ends before the peer's record
    /// arrives or the record is malformed.
    pub async fn handshake(&mut self) -> Result<(), ServerError> {
        if self.session.role() == Role::Initiator {
            let actions = self.session.handle(SessionEvent::Start)?;
            self.execute(actions).await?;
        }

        let record = self.transport.read_frame().await?.ok_or_else(|| {
            ServerError::Transport("stream closed during handshake".to_string())
        })?;
        let actions = self.session.handle(SessionEvent::HandshakeReceived(record))?;
        self.execute(actions).await?;

        Ok(())
    }

    /// Encrypt and send one application message.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Session` if the session refuses the message
    /// (nothing is written in that case), or a transport error.
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<(), ServerError> {
        let actions = self.session.handle(SessionEvent::Send { plaintext: plaintext.to_vec() })?;
        self.execute(actions).await?;
        Ok(())
    }

    /// Wait for the next message or for the session to close.
    ///
    /// Frames the session rejects with a non-fatal error are logged and
    /// skipped. Returns `Ok(None)` if the stream ends first.
    ///
    /// # Errors
    ///
    /// Returns a fatal `ServerError::Session` error (authentication failure,
    /// sequence mismatch) or a transport/framing error.
    pub async fn recv(&mut self) -> Result<Option<Received>, ServerError> {
        loop {
            let Some(frame) = self.transport.read_frame().await? else {
                tracing::debug!(state = ?self.session.state(), "stream ended");
                return Ok(None);
            };

            let actions = match self.session.handle(SessionEvent::FrameReceived(frame)) {
                Ok(actions) => actions,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Frame rejected: {}", e);
                    continue;
                },
            };

            if let Some(received) = self.execute(actions).await? {
                return Ok(Some(received));
            }
        }
    }

    /// Close gracefully: send the farewell and wait for the acknowledgment.
    ///
    /// A session that never finished its handshake is aborted locally.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the stream ends before the
    /// acknowledgment arrives.
    pub async fn close(&mut self) -> Result<CloseReason, ServerError> {
        let actions = self.session.handle(SessionEvent::Close)?;
        if let Some(Received::Closed(reason)) = self.execute(actions).await? {
            return Ok(reason);
        }

        loop {
            match self.recv().await? {
                Some(Received::Closed(reason)) => {
                    self.transport.shutdown().await?;
                    return Ok(reason);
                },
                Some(Received::Message(_)) => {
                    tracing::debug!("discarding message received while closing");
                },
                None => {
                    return Err(ServerError::Transport(
                        "stream closed before close acknowledgment".to_string(),
                    ));
                },
            }
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Execute session actions, returning what the application should see.
    async fn execute(
        &mut self,
        actions: Vec<SessionAction>,
    ) -> Result<Option<Received>, ServerError> {
        let mut received = None;

        for action in actions {
            match action {
                SessionAction::SendHandshake(record) => {
                    self.transport.write_frame(&record).await?;
                },
                SessionAction::SendFrame(frame) => {
                    tracing::debug!(len = frame.len(), "sending frame");
                    self.transport.write_frame(&frame).await?;
                },
                SessionAction::Deliver { plaintext } => {
                    received = Some(Received::Message(plaintext));
                },
                SessionAction::KeyTableWrapped { regeneration_count } => {
                    tracing::info!(regeneration_count, "key table wrapped");
                },
                SessionAction::Closed { reason } => {
                    tracing::info!(?reason, "session closed");
                    received = Some(Received::Closed(reason));
                },
            }
        }

        Ok(received)
    }
}

impl<S, E: Environment> std::fmt::Debug for Connection<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("session", &self.session).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use polymorph_core::{NodeParams, SessionConfig};
    use tokio::io::{DuplexStream, duplex};

    use super::*;
    use crate::{SystemEnv, transport::DEFAULT_MAX_FRAME_SIZE};

    fn connection(
        stream: DuplexStream,
        role: Role,
        local: NodeParams,
    ) -> Connection<DuplexStream, SystemEnv> {
        let session = PeerSession::new(SystemEnv::new(), role, local, SessionConfig::default());
        Connection::new(FrameTransport::new(stream, DEFAULT_MAX_FRAME_SIZE), session)
    }

    fn pair() -> (Connection<DuplexStream, SystemEnv>, Connection<DuplexStream, SystemEnv>) {
        let (a, b) = duplex(4096);
        (
            connection(a, Role::Initiator, NodeParams { node_id: 1, prime: 101, seed: 40 }),
            connection(b, Role::Responder, NodeParams { node_id: 2, prime: 103, seed: 2 }),
        )
    }

    #[tokio::test]
    async fn handshake_then_exchange() {
        let (mut client, mut server) = pair();

        let (c, s) = tokio::join!(client.handshake(), server.handshake());
        c.unwrap();
        s.unwrap();
        assert_eq!(client.state(), SessionState::Active);
        assert_eq!(server.state(), SessionState::Active);

        client.send(b"ping pong").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Some(Received::Message(b"ping pong".to_vec())));

        server.send(b"pong ping").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(Received::Message(b"pong ping".to_vec())));
        assert_eq!(client.session().cursor(), server.session().cursor());
    }

    #[tokio::test]
    async fn close_is_acknowledged() {
        let (mut client, mut server) = pair();
        let (c, s) = tokio::join!(client.handshake(), server.handshake());
        c.unwrap();
        s.unwrap();

        let (closed, remote) = tokio::join!(client.close(), server.recv());

        assert_eq!(closed.unwrap(), CloseReason::Local);
        assert_eq!(remote.unwrap(), Some(Received::Closed(CloseReason::Remote)));
        assert_eq!(client.state(), SessionState::Closed);
        assert_eq!(server.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn rejected_send_writes_nothing() {
        let (mut client, mut server) = pair();
        let (c, s) = tokio::join!(client.handshake(), server.handshake());
        c.unwrap();
        s.unwrap();

        let err = client.send(b"").await.unwrap_err();
        assert!(!err.is_fatal());

        client.send(b"after the error").await.unwrap();
        assert_eq!(
            server.recv().await.unwrap(),
            Some(Received::Message(b"after the error".to_vec()))
        );
    }

    #[tokio::test]
    async fn handshake_fails_on_closed_stream() {
        let (a, b) = duplex(64);
        drop(b);
        let mut server =
            connection(a, Role::Responder, NodeParams { node_id: 2, prime: 103, seed: 2 });

        assert!(matches!(server.handshake().await, Err(ServerError::Transport(_))));
    }
}

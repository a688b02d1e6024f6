//! Session events and actions.
//!
//! The session is a pure state machine: the driver feeds it
//! [`SessionEvent`]s and executes the [`SessionAction`]s it returns.

/// Input to a [`PeerSession`](crate::PeerSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Begin the handshake by announcing local parameters.
    Start,

    /// Peer's cleartext handshake record arrived.
    HandshakeReceived(Vec<u8>),

    /// Application wants to send a message.
    Send {
        /// Message content.
        plaintext: Vec<u8>,
    },

    /// Encrypted frame arrived from the peer.
    FrameReceived(Vec<u8>),

    /// Application wants to close the session.
    Close,
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// We sent the farewell and the peer acknowledged it.
    Local,
    /// The peer sent the farewell and we acknowledged it.
    Remote,
    /// Closed before the handshake completed.
    Aborted,
}

/// Output of a [`PeerSession`](crate::PeerSession) for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Write the cleartext handshake record to the transport.
    SendHandshake(Vec<u8>),

    /// Write an encrypted frame to the transport.
    SendFrame(Vec<u8>),

    /// Hand a decrypted message to the application.
    Deliver {
        /// Message content.
        plaintext: Vec<u8>,
    },

    /// The key index wrapped around the table.
    ///
    /// Notification only: the table itself is unchanged.
    KeyTableWrapped {
        /// Number of completed passes over the table.
        regeneration_count: u64,
    },

    /// Key material has been erased; the session is finished.
    Closed {
        /// How the session ended.
        reason: CloseReason,
    },
}

//! Peer session state machine.
//!
//! One `PeerSession` per connection, owned exclusively by that connection's
//! driver. Both ends advance the same cursor over the same transcript:
//!
//! ```text
//! Unestablished ──Start──► Handshaking ──HandshakeReceived──► Active
//!       │                                                      │  ▲
//!       └───────────HandshakeReceived (responder)──────────────┘  │ Send / FrameReceived
//!                                                              │──┘
//!                                  Close: send farewell ──► Closing ──ack──► Closed
//!                     FrameReceived(farewell): send ack ───────────────────► Closed
//! ```
//!
//! # Invariants
//!
//! - Lockstep: key index and sequence number change together, once per
//!   successfully sent or received message, in transcript order
//! - Self-derived: the next sequence number is read from plaintext this side
//!   produced or authenticated, never from an unauthenticated field
//! - All-or-nothing: a non-fatal error leaves the session untouched
//! - Fail closed: a fatal error moves the session to `Closed`
//! - Erasure: reaching `Closed` drops the key table, which zeroizes it

use std::time::Instant;

use polymorph_crypto::{CodecError, Extraction, KeyTable, SequenceNumber, decode, encode};

use crate::{
    entropy::{NodeParams, Role},
    env::Environment,
    error::SessionError,
    event::{CloseReason, SessionAction, SessionEvent},
    handshake::{DEFAULT_TABLE_SIZE, HandshakeRecord, SharedParams},
    monitor::{self, KeyStatus},
};

/// Plaintext announcing a close.
pub const FAREWELL: &[u8] = b"LCM:FAREWELL";

/// Plaintext acknowledging a close.
pub const FAREWELL_ACK: &[u8] = b"LCM:ACK";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing exchanged.
    Unestablished,
    /// Local record sent, waiting for the peer's.
    Handshaking,
    /// Key table derived; messages flow.
    Active,
    /// Farewell sent, waiting for the acknowledgment.
    Closing,
    /// Key material erased. Terminal.
    Closed,
}

/// Session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of keys derived at handshake. Must be at least 1.
    pub table_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { table_size: DEFAULT_TABLE_SIZE }
    }
}

/// Position in the shared transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Index of the key for the next message.
    pub key_index: u32,
    /// Sequence number (scheme) for the next message.
    pub seq: SequenceNumber,
    /// Instruction that reads the sequence number after that.
    ///
    /// Always equal to `seq.scheme().next`.
    pub instruction: Extraction,
}

impl Cursor {
    /// Cursor at handshake completion.
    pub const INITIAL: Self =
        Self { key_index: 0, seq: SequenceNumber::MIN, instruction: Extraction::INITIAL };

    /// Advance past a message with `plaintext`.
    ///
    /// Pure transition: the same cursor and plaintext always yield the same
    /// successor, which is what keeps both ends in lockstep.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::ExtractionOutOfRange` if the plaintext is too
    /// short for the current instruction.
    pub fn advance(self, plaintext: &[u8], table_len: u32) -> Result<Advance, CodecError> {
        let seq = self.instruction.extract(plaintext)?;
        let key_index = (self.key_index + 1) % table_len;

        Ok(Advance {
            cursor: Self { key_index, seq, instruction: seq.scheme().next },
            wrapped: key_index == 0,
        })
    }
}

/// Result of [`Cursor::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// The successor cursor.
    pub cursor: Cursor,
    /// True if the key index wrapped back to 0.
    pub wrapped: bool,
}

/// Key material and cursor, present only while established.
struct Established {
    table: KeyTable,
    cursor: Cursor,
    params: SharedParams,
    established_at: Instant,
}

impl Established {
    fn current_key(&self) -> Option<u64> {
        self.table.get(self.cursor.key_index)
    }
}

/// Per-connection session.
///
/// Pure state machine - returns actions, caller handles I/O. Must be driven
/// sequentially in transcript order; it is never shared across connections.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct PeerSession<E: Environment> {
    env: E,
    role: Role,
    local: NodeParams,
    config: SessionConfig,
    state: SessionState,
    established: Option<Established>,
    regeneration_count: u64,
    messages: u64,
}

impl<E: Environment> PeerSession<E> {
    /// Create an unestablished session.
    pub fn new(env: E, role: Role, local: NodeParams, config: SessionConfig) -> Self {
        Self {
            env,
            role,
            local,
            config,
            state: SessionState::Unestablished,
            established: None,
            regeneration_count: 0,
            messages: 0,
        }
    }

    /// This end's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current cursor, while established.
    pub fn cursor(&self) -> Option<Cursor> {
        self.established.as_ref().map(|e| e.cursor)
    }

    /// Index of the key for the next message, while established.
    pub fn key_index(&self) -> Option<u32> {
        self.cursor().map(|c| c.key_index)
    }

    /// Sequence number for the next message, while established.
    pub fn sequence_number(&self) -> Option<SequenceNumber> {
        self.cursor().map(|c| c.seq)
    }

    /// Parameters agreed at handshake, while established.
    pub fn shared_params(&self) -> Option<&SharedParams> {
        self.established.as_ref().map(|e| &e.params)
    }

    /// Number of times the key index has wrapped.
    pub fn regeneration_count(&self) -> u64 {
        self.regeneration_count
    }

    /// Messages sent and received since the handshake.
    pub fn message_count(&self) -> u64 {
        self.messages
    }

    /// Rotation state and fingerprint of every key, while established.
    ///
    /// Empty once the session is closed.
    pub fn key_status(&self) -> Vec<KeyStatus> {
        self.established.as_ref().map_or_else(Vec::new, |e| {
            monitor::snapshot(&e.table, e.cursor.key_index, self.regeneration_count > 0)
        })
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the event cannot be processed. After a
    /// non-fatal error the session is unchanged; after a fatal one it is
    /// `Closed` and its key material erased.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        let result = match event {
            SessionEvent::Start => self.handle_start(),
            SessionEvent::HandshakeReceived(record) => self.handle_handshake(&record),
            SessionEvent::Send { plaintext } => self.handle_send(&plaintext),
            SessionEvent::FrameReceived(frame) => self.handle_frame(&frame),
            SessionEvent::Close => self.handle_close(),
        };

        if let Err(e) = &result
            && e.is_fatal()
        {
            tracing::warn!(role = self.role.tag(), error = %e, "fatal session error");
            self.erase();
        }

        result
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState { operation, state: self.state }
    }

    fn local_record(&self) -> Vec<u8> {
        HandshakeRecord::from_params(&self.local).to_bytes()
    }

    /// Announce local parameters.
    fn handle_start(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Unestablished {
            return Err(self.invalid("start"));
        }

        self.state = SessionState::Handshaking;
        tracing::debug!(role = self.role.tag(), "handshake started");

        Ok(vec![SessionAction::SendHandshake(self.local_record())])
    }

    /// Combine the peer's record with ours and derive the key table.
    ///
    /// A responder that has not announced yet answers with its own record.
    fn handle_handshake(&mut self, record: &[u8]) -> Result<Vec<SessionAction>, SessionError> {
        let reply = match self.state {
            SessionState::Unestablished => Some(self.local_record()),
            SessionState::Handshaking => None,
            _ => return Err(self.invalid("handshake")),
        };

        let peer = HandshakeRecord::parse(record)?;
        let params = SharedParams::new(&self.local, &peer, self.config.table_size);
        let table = params.derive_key_table(self.role)?;

        tracing::info!(
            role = self.role.tag(),
            node_id = format_args!("{:08x}", self.local.node_id),
            local_prime = params.p,
            peer_prime = params.q,
            table_size = params.n,
            "session established"
        );

        self.established = Some(Established {
            table,
            cursor: Cursor::INITIAL,
            params,
            established_at: self.env.now(),
        });
        self.state = SessionState::Active;

        Ok(reply.map(SessionAction::SendHandshake).into_iter().collect())
    }

    /// Encrypt an application message.
    fn handle_send(&mut self, plaintext: &[u8]) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Active {
            return Err(self.invalid("send"));
        }
        if is_reserved(plaintext) {
            return Err(SessionError::ReservedPayload);
        }

        self.seal(plaintext)
    }

    /// Start a graceful close, or abort a session that never got established.
    fn handle_close(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Unestablished | SessionState::Handshaking => {
                self.erase();
                Ok(vec![SessionAction::Closed { reason: CloseReason::Aborted }])
            },
            SessionState::Active => {
                let actions = self.seal(FAREWELL)?;
                self.state = SessionState::Closing;
                tracing::debug!(role = self.role.tag(), "farewell sent");
                Ok(actions)
            },
            SessionState::Closing | SessionState::Closed => Err(self.invalid("close")),
        }
    }

    /// Authenticate and decode a frame from the peer.
    fn handle_frame(&mut self, frame: &[u8]) -> Result<Vec<SessionAction>, SessionError> {
        if !matches!(self.state, SessionState::Active | SessionState::Closing) {
            return Err(self.invalid("receive"));
        }
        let established = self.established.as_ref().ok_or_else(|| self.invalid("receive"))?;
        let key = established.current_key().ok_or_else(|| self.invalid("receive"))?;
        let cursor = established.cursor;

        let decoded = decode(frame, key)?;
        if decoded.seq != cursor.seq {
            tracing::warn!(
                expected = %cursor.seq,
                actual = %decoded.seq,
                "frame sequence number does not match transcript"
            );
            return Err(SessionError::SequenceMismatch {
                expected: cursor.seq,
                actual: decoded.seq,
            });
        }
        debug_assert_eq!(decoded.next, cursor.instruction);

        let advance = cursor.advance(&decoded.plaintext, established.table.len())?;

        match (self.state, Kind::of(&decoded.plaintext)) {
            (SessionState::Active, Kind::Farewell) => {
                let mut actions = self.commit(advance);
                actions.extend(self.seal(FAREWELL_ACK)?);
                self.erase();
                tracing::info!(role = self.role.tag(), "peer closed session");
                actions.push(SessionAction::Closed { reason: CloseReason::Remote });
                Ok(actions)
            },
            (SessionState::Closing, Kind::Ack) => {
                let mut actions = self.commit(advance);
                self.erase();
                tracing::info!(role = self.role.tag(), "session closed");
                actions.push(SessionAction::Closed { reason: CloseReason::Local });
                Ok(actions)
            },
            (SessionState::Active, Kind::Ack) => Err(self.invalid("acknowledge")),
            (_, Kind::Farewell | Kind::Regular) if self.state == SessionState::Closing => {
                Err(self.invalid("receive"))
            },
            _ => {
                let mut actions = self.commit(advance);
                actions.push(SessionAction::Deliver { plaintext: decoded.plaintext });
                Ok(actions)
            },
        }
    }

    /// Encrypt `plaintext` at the current cursor and advance.
    ///
    /// The successor cursor is computed first, so a plaintext too short for
    /// the current instruction is rejected before anything is encrypted.
    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<SessionAction>, SessionError> {
        let established = self.established.as_ref().ok_or_else(|| self.invalid("send"))?;
        let key = established.current_key().ok_or_else(|| self.invalid("send"))?;
        let cursor = established.cursor;

        let advance = cursor.advance(plaintext, established.table.len())?;
        let nonce = self.env.nonce()?;
        let frame = encode(plaintext, cursor.seq.value(), key, nonce)?;

        let mut actions = vec![SessionAction::SendFrame(frame)];
        actions.extend(self.commit(advance));
        Ok(actions)
    }

    /// Move to the successor cursor; report a wrap.
    fn commit(&mut self, advance: Advance) -> Vec<SessionAction> {
        let Some(established) = self.established.as_mut() else {
            return Vec::new();
        };

        tracing::debug!(
            key_index = established.cursor.key_index,
            seq = %established.cursor.seq,
            next_key_index = advance.cursor.key_index,
            next_seq = %advance.cursor.seq,
            "cursor advanced"
        );

        established.cursor = advance.cursor;
        self.messages += 1;

        if !advance.wrapped {
            return Vec::new();
        }

        self.regeneration_count += 1;
        tracing::info!(regeneration_count = self.regeneration_count, "key table wrapped");

        vec![SessionAction::KeyTableWrapped { regeneration_count: self.regeneration_count }]
    }

    /// Drop key material and finish.
    fn erase(&mut self) {
        if let Some(established) = self.established.take() {
            tracing::debug!(
                messages = self.messages,
                elapsed_ms =
                    self.env.now().duration_since(established.established_at).as_millis(),
                "erasing key table"
            );
        }
        self.state = SessionState::Closed;
    }
}

impl<E: Environment> std::fmt::Debug for PeerSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("cursor", &self.cursor())
            .field("regeneration_count", &self.regeneration_count)
            .finish_non_exhaustive()
    }
}

/// What an authenticated plaintext means to the close protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Farewell,
    Ack,
    Regular,
}

impl Kind {
    fn of(plaintext: &[u8]) -> Self {
        if plaintext == FAREWELL {
            Self::Farewell
        } else if plaintext == FAREWELL_ACK {
            Self::Ack
        } else {
            Self::Regular
        }
    }
}

fn is_reserved(plaintext: &[u8]) -> bool {
    Kind::of(plaintext) != Kind::Regular
}

//! Polymorph Core
//!
//! Sans-IO protocol logic for one peer-to-peer Polymorph session: node
//! parameter generation, the first-contact handshake, and the
//! [`PeerSession`] state machine that keeps both ends' key index and scheme
//! in lockstep.
//!
//! # Architecture
//!
//! ```text
//! EntropySource ──► NodeParams ──► HandshakeRecord ──► SharedParams ──► KeyTable
//!                                                                         │
//!      SessionEvent ──► PeerSession::handle ──► Vec<SessionAction> ◄──────┘
//! ```
//!
//! The session performs no I/O. Drivers feed it [`SessionEvent`]s and
//! execute the returned [`SessionAction`]s; time and randomness come from
//! an [`Environment`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod entropy;
pub mod env;
pub mod error;
pub mod event;
pub mod handshake;
pub mod monitor;
pub mod prime;
pub mod session;

pub use entropy::{EntropySource, EnvEntropy, NodeParams, Role};
pub use env::{EntropyError, Environment};
pub use error::SessionError;
pub use event::{CloseReason, SessionAction, SessionEvent};
pub use handshake::{DEFAULT_TABLE_SIZE, HandshakeRecord, MAX_RECORD_LEN, SharedParams};
pub use monitor::{KeyState, KeyStatus};
pub use polymorph_crypto::MIN_FRAME_SIZE;
pub use session::{
    Advance, Cursor, FAREWELL, FAREWELL_ACK, PeerSession, SessionConfig, SessionState,
};

//! # Autoscene Protocol Library
//!
//! Wire-level definitions for talking to the remote control surface
//! (OBS Studio via obs-websocket 5.x).
//!
//! The daemon treats the surface as a black box reachable over a persistent
//! WebSocket session. This crate pins down that boundary:
//!
//! - **Frames**: the `{"op", "d"}` envelope with the handshake
//!   (`Hello`/`Identify`/`Identified`) and RPC (`Request`/`RequestResponse`)
//!   payloads the daemon exchanges.
//! - **Authentication**: the salted SHA-256 challenge/response string
//!   computation used during `Identify`.
//! - **Errors**: [`ProtocolError`] for malformed or unsupported frames.
//!
//! Connection management, reconnection and command semantics live in the
//! daemon crate; nothing here performs I/O.

pub mod auth;
pub mod error;
pub mod messages;

pub use auth::authentication_string;
pub use error::{ProtocolError, Result};
pub use messages::{
    close_code, status, AuthChallenge, ClientMessage, Event, Hello, Identified, Identify, Request,
    RequestResponse, RequestStatus, Scene, SceneList, ServerMessage, RPC_VERSION,
};

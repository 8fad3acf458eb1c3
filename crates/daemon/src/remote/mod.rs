//! Remote control surface session.
//!
//! This module owns the persistent WebSocket connection to the control
//! surface. [`RemoteSession`] keeps a single connection alive with
//! automatic reconnection and exposes a narrow surface to the rest of the
//! daemon: a fail-fast `send_command`, a read-only connection-state signal
//! and a reconnect-attempt counter. No other component touches the socket.

mod backoff;
mod session;

use std::time::Duration;

use thiserror::Error;

use crate::config::ControlConfig;

pub use backoff::Backoff;
pub use session::RemoteSession;

/// Connection state of the control surface session.
///
/// Transitions are serialized inside the session's connection loop; other
/// components only observe the state through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be (initial and terminal state).
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Session established, commands can be sent.
    Connected,
    /// Connection lost; retrying with backoff.
    Reconnecting,
}

/// Failure to establish a session with the control surface.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP/WebSocket level failure, host down or refusing.
    #[error("control surface unreachable: {0}")]
    Unreachable(String),

    /// The handshake derailed (unexpected frame, bad payload).
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The surface rejected our authentication string.
    #[error("authentication rejected by control surface")]
    AuthRejected,

    /// The attempt exceeded its time budget.
    #[error("connection attempt timed out")]
    Timeout,
}

/// Failure to deliver a command over an established (or absent) session.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No session right now; the command is dropped, never queued.
    #[error("not connected to control surface")]
    NotConnected,

    /// The named scene does not exist on the surface.
    #[error("unknown scene: {scene}")]
    UnknownTarget {
        /// The scene name that failed to resolve.
        scene: String,
    },

    /// The transport died mid-command; a reconnect cycle has been started.
    #[error("transport failure while sending command")]
    TransportFailure,

    /// The surface did not answer within the command timeout.
    #[error("command timed out")]
    Timeout,

    /// The surface answered with a failure status other than "not found".
    #[error("control surface rejected command: code {code}, comment {comment:?}")]
    Remote {
        /// Protocol status code.
        code: u16,
        /// Optional explanation from the surface.
        comment: Option<String>,
    },
}

/// Where and how to reach the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTarget {
    /// Hostname or address.
    pub host: String,
    /// WebSocket port.
    pub port: u16,
    /// Shared password, empty when authentication is disabled.
    pub password: String,
}

impl ControlTarget {
    /// WebSocket URL for this target.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl From<&ControlConfig> for ControlTarget {
    fn from(config: &ControlConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
        }
    }
}

/// Tuning knobs for the session; not user configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Budget for one connect + handshake attempt.
    pub connect_timeout: Duration,
    /// Budget for one command round trip.
    pub command_timeout: Duration,
    /// Backoff delay after the immediate retry.
    pub backoff_base: Duration,
    /// Ceiling for the backoff delay.
    pub backoff_cap: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    /// Sets the connect + handshake budget.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the command round-trip budget.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the backoff base delay and ceiling.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }
}

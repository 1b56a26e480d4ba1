//! Base traits and types for the realtime speech backend.
//!
//! A [`RealtimeConnector`] opens one duplex connection per call. The connection
//! is exposed as a pair of channels so the upstream client can run its send and
//! receive loops independently of the transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::openai::{ClientEvent, ServerEvent, SessionConfig};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the realtime backend.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The connection is gone
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection
// =============================================================================

/// One open connection to the realtime backend.
///
/// Dropping the connection tears down the transport tasks behind it.
pub struct RealtimeConnection {
    events: mpsc::Sender<ClientEvent>,
    server_events: mpsc::Receiver<RealtimeResult<ServerEvent>>,
    guard: DropGuard,
}

impl RealtimeConnection {
    /// Wrap the channel ends of a transport.
    ///
    /// `shutdown` is cancelled when the connection is dropped.
    pub fn new(
        events: mpsc::Sender<ClientEvent>,
        server_events: mpsc::Receiver<RealtimeResult<ServerEvent>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            server_events,
            guard: shutdown.drop_guard(),
        }
    }

    /// Split into the outbound sender, the inbound receiver and the guard that
    /// keeps the transport alive.
    ///
    /// Dropping the sender stops outbound traffic without closing the inbound side.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<ClientEvent>,
        mpsc::Receiver<RealtimeResult<ServerEvent>>,
        DropGuard,
    ) {
        (self.events, self.server_events, self.guard)
    }
}

/// Opens connections to a realtime speech backend.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Open a new connection for one call.
    async fn connect(&self) -> RealtimeResult<RealtimeConnection>;

    /// Session configuration to send before any audio.
    fn session_config(&self) -> SessionConfig;
}

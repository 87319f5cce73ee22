//! Error taxonomy for the session layer.

use huddle_protocol::ProtocolError;
use huddle_transport::TransportError;
use thiserror::Error;

/// Session errors.
///
/// Only operations with an explicit return value surface errors; inbound
/// dispatch failures are contained and logged.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Broadcast issued while the known-peer roster is empty.
    #[error("No known receivers")]
    NoReceivers,

    /// Request expired before its completion policy was satisfied.
    #[error("Request timed out")]
    RequestTimeout,

    /// Request canceled before completion.
    #[error("Request canceled: {0}")]
    Canceled(String),

    /// Operation requires a connected session.
    #[error("Session not connected")]
    NotConnected,

    /// `connect` called on a session that is not disconnected.
    #[error("Session already connected")]
    AlreadyConnected,

    /// Failure surfaced by the underlying transport.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope encoding failure on an outbound operation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

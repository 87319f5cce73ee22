//! Transport abstraction traits for huddle.
//!
//! The session layer consumes a publish/subscribe broker through this
//! interface; connection management, QoS delivery, and wire framing are the
//! broker's concern. A successful `publish` means the broker accepted the
//! message, not that any peer has processed it.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Quality-of-service level for subscriptions and publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// At-least-once delivery.
    #[default]
    AtLeastOnce,
    /// Exactly-once delivery, where the broker supports it.
    ExactlyOnce,
}

/// Options for a topic subscription.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Requested delivery guarantee.
    pub qos: QoS,
    /// Suppress delivery of this client's own publications.
    pub no_local: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            no_local: true,
        }
    }
}

/// Options for a publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Requested delivery guarantee.
    pub qos: QoS,
}

/// A message delivered by the transport.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw message payload.
    pub payload: Bytes,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation attempted before `connect` (or after `disconnect`).
    #[error("Transport not connected")]
    NotConnected,

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A publish/subscribe transport.
///
/// `connect` hands back the single inbound delivery stream for this client;
/// dropping the receiver (or calling `disconnect`) detaches it. No ordering
/// or deduplication guarantee beyond the broker's own: consumers must be
/// idempotent under duplicate and out-of-order delivery.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection and return the inbound delivery stream.
    async fn connect(&self) -> Result<mpsc::Receiver<Inbound>, TransportError>;

    /// Tear down the connection and all subscriptions.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic.
    async fn subscribe(&self, topic: &str, options: SubscribeOptions)
        -> Result<(), TransportError>;

    /// Publish a payload to a topic.
    ///
    /// Resolves once the broker has accepted the message for delivery.
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        options: PublishOptions,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_options_default() {
        let options = SubscribeOptions::default();
        assert_eq!(options.qos, QoS::AtLeastOnce);
        assert!(options.no_local);
    }
}

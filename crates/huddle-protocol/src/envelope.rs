//! Envelope types for the huddle session protocol.
//!
//! Envelopes are the messages peers exchange over the pub/sub transport:
//! heartbeats, addressed requests, broadcast requests, and responses.
//! On the wire each variant is a bare JSON object; variants are told apart
//! by field shape, not by a discriminant tag.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque peer identifier.
pub type PeerId = String;

/// Correlation identifier linking a request to its response(s).
pub type CorrelationId = String;

/// URL-safe alphabet used for peer and correlation identifiers.
const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of generated identifiers.
const ID_LENGTH: usize = 10;

/// Generate a random URL-safe identifier.
///
/// Ten characters from a 64-symbol alphabet give 60 bits of entropy;
/// collisions within one session's lifetime are treated as negligible.
#[must_use]
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Current wall clock as unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A protocol envelope.
///
/// Variant order matters: serde tries untagged variants in declaration
/// order and unknown fields are ignored, so `Request` must precede
/// `BroadcastRequest` (a request is a broadcast request plus `receiverId`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Envelope {
    /// Addressed request, expected to be answered by exactly one peer.
    Request {
        correlation_id: CorrelationId,
        sender_id: PeerId,
        receiver_id: PeerId,
        #[serde(rename = "type")]
        kind: String,
        payload: serde_json::Value,
    },

    /// Broadcast request, expected to be answered by every known peer.
    BroadcastRequest {
        correlation_id: CorrelationId,
        sender_id: PeerId,
        #[serde(rename = "type")]
        kind: String,
        payload: serde_json::Value,
    },

    /// Heartbeat carrying the sender's liveness status.
    Ping {
        peer_id: PeerId,
        last_seen_at: u64,
        status: String,
    },

    /// Acknowledgment of a prior request.
    Response {
        correlation_id: CorrelationId,
        responder_id: PeerId,
    },
}

impl Envelope {
    /// The correlation id carried by this envelope, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Envelope::Request { correlation_id, .. }
            | Envelope::BroadcastRequest { correlation_id, .. }
            | Envelope::Response { correlation_id, .. } => Some(correlation_id),
            Envelope::Ping { .. } => None,
        }
    }

    /// The peer that produced this envelope.
    #[must_use]
    pub fn origin(&self) -> &str {
        match self {
            Envelope::Request { sender_id, .. }
            | Envelope::BroadcastRequest { sender_id, .. } => sender_id,
            Envelope::Response { responder_id, .. } => responder_id,
            Envelope::Ping { peer_id, .. } => peer_id,
        }
    }
}

/// Builds envelopes stamped with the local peer identity.
///
/// Pure constructors aside from correlation-id generation; no I/O.
#[derive(Debug, Clone)]
pub struct EnvelopeFactory {
    peer_id: PeerId,
}

impl EnvelopeFactory {
    /// Create a factory for the given local peer.
    #[must_use]
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
        }
    }

    /// Create a factory with a freshly generated local peer id.
    #[must_use]
    pub fn with_generated_id() -> Self {
        Self::new(generate_id())
    }

    /// The local peer id this factory stamps onto envelopes.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Build a heartbeat with the current time and the given status.
    #[must_use]
    pub fn new_ping(&self, status: impl Into<String>) -> Envelope {
        Envelope::Ping {
            peer_id: self.peer_id.clone(),
            last_seen_at: now_millis(),
            status: status.into(),
        }
    }

    /// Build an addressed request with a fresh correlation id.
    #[must_use]
    pub fn new_request(
        &self,
        payload: serde_json::Value,
        kind: impl Into<String>,
        receiver_id: impl Into<PeerId>,
    ) -> Envelope {
        self.new_request_with_id(generate_id(), payload, kind, receiver_id)
    }

    /// Build an addressed request carrying a caller-supplied correlation id.
    #[must_use]
    pub fn new_request_with_id(
        &self,
        correlation_id: impl Into<CorrelationId>,
        payload: serde_json::Value,
        kind: impl Into<String>,
        receiver_id: impl Into<PeerId>,
    ) -> Envelope {
        Envelope::Request {
            correlation_id: correlation_id.into(),
            sender_id: self.peer_id.clone(),
            receiver_id: receiver_id.into(),
            kind: kind.into(),
            payload,
        }
    }

    /// Build a broadcast request with a fresh correlation id.
    #[must_use]
    pub fn new_broadcast_request(
        &self,
        payload: serde_json::Value,
        kind: impl Into<String>,
    ) -> Envelope {
        self.new_broadcast_request_with_id(generate_id(), payload, kind)
    }

    /// Build a broadcast request carrying a caller-supplied correlation id.
    #[must_use]
    pub fn new_broadcast_request_with_id(
        &self,
        correlation_id: impl Into<CorrelationId>,
        payload: serde_json::Value,
        kind: impl Into<String>,
    ) -> Envelope {
        Envelope::BroadcastRequest {
            correlation_id: correlation_id.into(),
            sender_id: self.peer_id.clone(),
            kind: kind.into(),
            payload,
        }
    }

    /// Build a response acknowledging the given correlation id.
    #[must_use]
    pub fn new_response(&self, correlation_id: impl Into<CorrelationId>) -> Envelope {
        Envelope::Response {
            correlation_id: correlation_id.into(),
            responder_id: self.peer_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 10);
        assert!(id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'));
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_factory_stamps_peer_id() {
        let factory = EnvelopeFactory::new("peer-1");

        let ping = factory.new_ping("ready");
        assert_eq!(ping.origin(), "peer-1");

        let response = factory.new_response("corr-1");
        assert_eq!(response.origin(), "peer-1");
        assert_eq!(response.correlation_id(), Some("corr-1"));
    }

    #[test]
    fn test_fresh_correlation_ids() {
        let factory = EnvelopeFactory::new("peer-1");

        let a = factory.new_request(json!({}), "move", "peer-2");
        let b = factory.new_request(json!({}), "move", "peer-2");
        assert_ne!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn test_request_wire_fields() {
        let factory = EnvelopeFactory::new("alice");
        let request = factory.new_request(json!({"sq": "e4"}), "move", "bob");

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["receiverId"], "bob");
        assert_eq!(value["type"], "move");
        assert_eq!(value["payload"]["sq"], "e4");
        assert!(value.get("correlationId").is_some());
    }

    #[test]
    fn test_untagged_shape_discrimination() {
        let request: Envelope = serde_json::from_value(json!({
            "correlationId": "c1",
            "senderId": "a",
            "receiverId": "b",
            "type": "move",
            "payload": {}
        }))
        .unwrap();
        assert!(matches!(request, Envelope::Request { .. }));

        let broadcast: Envelope = serde_json::from_value(json!({
            "correlationId": "c2",
            "senderId": "a",
            "type": "move",
            "payload": {}
        }))
        .unwrap();
        assert!(matches!(broadcast, Envelope::BroadcastRequest { .. }));

        let ping: Envelope = serde_json::from_value(json!({
            "peerId": "a",
            "lastSeenAt": 1000,
            "status": "ready"
        }))
        .unwrap();
        assert!(matches!(ping, Envelope::Ping { .. }));

        let response: Envelope = serde_json::from_value(json!({
            "correlationId": "c3",
            "responderId": "b"
        }))
        .unwrap();
        assert!(matches!(response, Envelope::Response { .. }));
    }
}

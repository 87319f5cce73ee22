//! Topic derivation for the huddle session protocol.
//!
//! All topics for one session live under a common prefix derived from the
//! session namespace and session id. Derivation is deterministic and pure.

use crate::envelope::PeerId;

/// Classification of an inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    /// The shared heartbeat topic.
    Ping,
    /// The shared broadcast message topic.
    Broadcast,
    /// A peer's addressed message topic.
    Direct(PeerId),
}

/// Topic scheme for one session.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    /// Create the topic scheme for a (namespace, session id) pair.
    #[must_use]
    pub fn new(namespace: &str, session_id: &str) -> Self {
        Self {
            prefix: format!("mqtt/game/{namespace}/{session_id}"),
        }
    }

    /// The heartbeat topic.
    #[must_use]
    pub fn ping(&self) -> String {
        format!("{}/ping", self.prefix)
    }

    /// The shared broadcast message topic.
    #[must_use]
    pub fn broadcast(&self) -> String {
        format!("{}/message", self.prefix)
    }

    /// The addressed message topic for a specific peer.
    #[must_use]
    pub fn direct(&self, peer_id: &str) -> String {
        format!("{}/message/{peer_id}", self.prefix)
    }

    /// Classify an inbound topic within this session's scheme.
    ///
    /// Returns `None` for topics outside the session prefix.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let rest = topic.strip_prefix(self.prefix.as_str())?;
        match rest {
            "/ping" => Some(TopicKind::Ping),
            "/message" => Some(TopicKind::Broadcast),
            _ => {
                let peer = rest.strip_prefix("/message/")?;
                if peer.is_empty() || peer.contains('/') {
                    None
                } else {
                    Some(TopicKind::Direct(peer.to_string()))
                }
            }
        }
    }
}

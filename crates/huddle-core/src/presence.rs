//! Presence tracking for huddle sessions.
//!
//! The roster of currently-alive peers is derived entirely from heartbeat
//! recency: there is no leave message, so departure is always detected by
//! the periodic sweep, never by event.

use huddle_protocol::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// Roster entry for a single peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer identifier.
    pub id: PeerId,
    /// Sender-stamped timestamp of the last observed ping, unix millis.
    pub last_seen_at: u64,
    /// Liveness status string carried by the last ping.
    pub status: String,
}

/// Tracker for the peers currently considered alive.
#[derive(Debug, Default)]
pub struct Presence {
    roster: HashMap<PeerId, PeerRecord>,
}

impl Presence {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed heartbeat.
    ///
    /// Idempotent upsert: last write wins on timestamp and status. A stale
    /// ping arriving after a fresher one overwrites it; timestamps are the
    /// sender's wall clock reads.
    ///
    /// Returns `true` if this is a previously-unknown peer.
    pub fn observe(
        &mut self,
        peer_id: impl Into<PeerId>,
        last_seen_at: u64,
        status: impl Into<String>,
    ) -> bool {
        let id = peer_id.into();
        let is_new = !self.roster.contains_key(&id);

        self.roster.insert(
            id.clone(),
            PeerRecord {
                id: id.clone(),
                last_seen_at,
                status: status.into(),
            },
        );

        if is_new {
            debug!(peer = %id, "Presence: peer appeared");
        }

        is_new
    }

    /// Remove every peer not refreshed within `stale_after` of `now_ms`.
    ///
    /// Returns the removed peer ids for observability.
    pub fn sweep(&mut self, now_ms: u64, stale_after: Duration) -> Vec<PeerId> {
        let threshold = stale_after.as_millis() as u64;
        let stale: Vec<PeerId> = self
            .roster
            .iter()
            .filter(|(_, record)| now_ms.saturating_sub(record.last_seen_at) > threshold)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.roster.remove(id);
            debug!(peer = %id, "Presence: evicted stale peer");
        }

        stale
    }

    /// Snapshot of the known peer ids, for broadcast fan-out.
    #[must_use]
    pub fn known_peers(&self) -> HashSet<PeerId> {
        self.roster.keys().cloned().collect()
    }

    /// Get the record for a peer.
    #[must_use]
    pub fn get(&self, peer_id: &str) -> Option<&PeerRecord> {
        self.roster.get(peer_id)
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Full roster snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.roster.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_upsert() {
        let mut presence = Presence::new();

        assert!(presence.observe("peer-1", 1_000, "ready"));
        assert!(!presence.observe("peer-1", 2_000, "busy"));

        let record = presence.get("peer-1").unwrap();
        assert_eq!(record.last_seen_at, 2_000);
        assert_eq!(record.status, "busy");
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_observe_out_of_order_last_write_wins() {
        let mut presence = Presence::new();

        presence.observe("peer-1", 5_000, "ready");
        // A delayed ping with an older timestamp still overwrites.
        presence.observe("peer-1", 3_000, "ready");

        assert_eq!(presence.get("peer-1").unwrap().last_seen_at, 3_000);
    }

    #[test]
    fn test_sweep_evicts_stale_peers() {
        let mut presence = Presence::new();
        presence.observe("fresh", 9_000, "ready");
        presence.observe("stale", 1_000, "ready");

        let removed = presence.sweep(10_000, Duration::from_millis(5_000));

        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(presence.get("stale").is_none());
        assert!(presence.known_peers().contains("fresh"));
    }

    #[test]
    fn test_sweep_keeps_peer_at_threshold() {
        let mut presence = Presence::new();
        presence.observe("edge", 5_000, "ready");

        // Exactly at the threshold is not yet stale.
        let removed = presence.sweep(10_000, Duration::from_millis(5_000));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_sweep_tolerates_future_timestamps() {
        let mut presence = Presence::new();
        presence.observe("ahead", 20_000, "ready");

        let removed = presence.sweep(10_000, Duration::from_millis(5_000));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_known_peers_snapshot() {
        let mut presence = Presence::new();
        presence.observe("a", 1, "ready");
        presence.observe("b", 2, "ready");

        let peers = presence.known_peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.contains("a") && peers.contains("b"));
    }
}

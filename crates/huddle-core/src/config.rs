//! Session configuration.
//!
//! A [`SessionConfig`] names the session a peer joins and tunes the
//! heartbeat, staleness, and request-expiry timers. The defaults keep the
//! staleness window at three heartbeat periods, so a peer always gets at
//! least two chances to refresh before eviction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one session coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session namespace (first topic path segment after the scheme prefix).
    pub namespace: String,

    /// Session identifier within the namespace.
    pub session_id: String,

    /// Heartbeat publish period in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Age past which an unrefreshed peer is evicted, in milliseconds.
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,

    /// Run the roster sweep and waiter expiry every Nth heartbeat tick.
    #[serde(default = "default_sweep_every_ticks")]
    pub sweep_every_ticks: u32,

    /// Age past which an unacknowledged request fails, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Capacity of the incoming application message channel.
    #[serde(default = "default_incoming_capacity")]
    pub incoming_capacity: usize,
}

// Default value functions
fn default_heartbeat_interval() -> u64 {
    5_000
}

fn default_stale_after() -> u64 {
    15_000 // 3 heartbeats
}

fn default_sweep_every_ticks() -> u32 {
    2
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_incoming_capacity() -> usize {
    256
}

impl SessionConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(namespace: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            session_id: session_id.into(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            stale_after_ms: default_stale_after(),
            sweep_every_ticks: default_sweep_every_ticks(),
            request_timeout_ms: default_request_timeout(),
            incoming_capacity: default_incoming_capacity(),
        }
    }

    /// Heartbeat publish period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Staleness threshold for peer eviction.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Expiry threshold for unacknowledged requests.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = SessionConfig::new("chess", "game-1");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.stale_after(), Duration::from_secs(15));
        assert_eq!(config.sweep_every_ticks, 2);
        // Staleness window must allow at least two refresh chances.
        assert!(config.stale_after_ms >= 2 * config.heartbeat_interval_ms);
    }

    #[test]
    fn test_config_from_json() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"namespace": "chess", "session_id": "game-1", "heartbeat_interval_ms": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.namespace, "chess");
        assert_eq!(config.heartbeat_interval_ms, 1000);
        assert_eq!(config.stale_after_ms, 15_000);
    }
}

//! In-process pub/sub broker.
//!
//! `MemoryBroker` is a process-wide hub that fans published payloads out to
//! exact-topic subscribers. It backs the integration tests and works as a
//! real transport for single-process embedders. QoS levels are accepted and
//! ignored: in-process delivery is reliable. The `no_local` option is
//! honored.

use crate::traits::{Inbound, PublishOptions, SubscribeOptions, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default inbound channel capacity per client.
const DEFAULT_CLIENT_CAPACITY: usize = 256;

/// Per-subscription state.
#[derive(Debug, Clone, Copy)]
struct Subscription {
    no_local: bool,
}

struct BrokerInner {
    /// Connected clients and their inbound senders.
    clients: DashMap<String, mpsc::Sender<Inbound>>,
    /// Topic name to subscribed client ids.
    topics: DashMap<String, DashMap<String, Subscription>>,
    /// Inbound channel capacity handed to each client.
    capacity: usize,
}

impl BrokerInner {
    fn detach(&self, client_id: &str) {
        self.clients.remove(client_id);
        for entry in self.topics.iter() {
            entry.value().remove(client_id);
        }
        self.topics.retain(|_, subs| !subs.is_empty());
        debug!(client = %client_id, "Broker: client detached");
    }

    fn deliver(&self, from: &str, topic: &str, payload: &Bytes) {
        let Some(subs) = self.topics.get(topic) else {
            trace!(topic = %topic, "Publish to topic with no subscribers");
            return;
        };

        for sub in subs.iter() {
            if sub.value().no_local && sub.key() == from {
                continue;
            }
            if let Some(tx) = self.clients.get(sub.key()) {
                let inbound = Inbound {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                // A full inbound queue means a stalled consumer; drop rather
                // than block the publisher.
                if tx.try_send(inbound).is_err() {
                    warn!(client = %sub.key(), topic = %topic, "Dropping delivery: inbound queue full or closed");
                }
            }
        }
    }
}

/// An in-process pub/sub broker shared by multiple clients.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create a new broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CLIENT_CAPACITY)
    }

    /// Create a broker with a specific per-client inbound capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                clients: DashMap::new(),
                topics: DashMap::new(),
                capacity,
            }),
        }
    }

    /// Mint a transport handle for the given client id.
    #[must_use]
    pub fn client(&self, client_id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            inner: Arc::clone(&self.inner),
            client_id: client_id.into(),
            connected: Mutex::new(false),
        }
    }

    /// Number of currently connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's handle onto a [`MemoryBroker`].
pub struct MemoryTransport {
    inner: Arc<BrokerInner>,
    client_id: String,
    connected: Mutex<bool>,
}

impl MemoryTransport {
    /// The client id this handle publishes as.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_connected(&self, value: bool) {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<Inbound>, TransportError> {
        // Reconnecting replaces any previous registration and its
        // subscriptions.
        self.inner.detach(&self.client_id);

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.clients.insert(self.client_id.clone(), tx);
        self.set_connected(true);

        debug!(client = %self.client_id, "Broker: client connected");
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.set_connected(false);
        self.inner.detach(&self.client_id);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.inner.topics.entry(topic.to_string()).or_default().insert(
            self.client_id.clone(),
            Subscription {
                no_local: options.no_local,
            },
        );

        debug!(client = %self.client_id, topic = %topic, "Broker: subscribed");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        _options: PublishOptions,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.inner.deliver(&self.client_id, topic, &payload);
        Ok(())
    }
}

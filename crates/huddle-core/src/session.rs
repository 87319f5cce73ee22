//! Session coordination.
//!
//! A [`Session`] joins one pub/sub session: it announces the local peer
//! with periodic heartbeats, tracks which other peers are alive, and routes
//! addressed and broadcast requests with completion tracking. All roster
//! and registry mutation happens from a single event-loop task; the shared
//! lock is never held across I/O.

use crate::config::SessionConfig;
use crate::correlation::{Completion, CompletionPolicy, CorrelationRegistry};
use crate::error::SessionError;
use crate::presence::{PeerRecord, Presence};
use huddle_protocol::{
    codec, generate_id, now_millis, CorrelationId, Envelope, EnvelopeFactory, PeerId,
    ProtocolError, TopicKind, Topics,
};
use huddle_transport::{Inbound, PublishOptions, SubscribeOptions, Transport};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// An application-level message delivered to this peer.
///
/// Acknowledgment back to the sender has already happened by the time the
/// application sees this.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Correlation id of the originating request.
    pub correlation_id: CorrelationId,
    /// Peer that sent the request.
    pub sender_id: PeerId,
    /// Application message type.
    pub kind: String,
    /// Opaque application payload.
    pub payload: serde_json::Value,
    /// Whether this arrived via the broadcast topic.
    pub broadcast: bool,
}

/// State mutated only under the session's single lock.
struct Shared {
    state: ConnectionState,
    status: String,
    roster: Presence,
    registry: CorrelationRegistry,
}

/// A peer's handle onto one session.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    factory: EnvelopeFactory,
    topics: Topics,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    event_task: Option<JoinHandle<()>>,
}

impl<T: Transport> Session<T> {
    /// Create a session with a freshly generated local peer id.
    #[must_use]
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_peer_id(transport, config, generate_id())
    }

    /// Create a session with an explicit local peer id.
    #[must_use]
    pub fn with_peer_id(transport: T, config: SessionConfig, peer_id: impl Into<PeerId>) -> Self {
        let topics = Topics::new(&config.namespace, &config.session_id);
        Self {
            transport: Arc::new(transport),
            factory: EnvelopeFactory::new(peer_id),
            topics,
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                status: String::new(),
                roster: Presence::new(),
                registry: CorrelationRegistry::new(),
            })),
            event_task: None,
        }
    }

    /// The local peer id.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        self.factory.peer_id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Snapshot of the currently known peer ids.
    #[must_use]
    pub fn known_peers(&self) -> HashSet<PeerId> {
        self.lock().roster.known_peers()
    }

    /// Snapshot of the full roster.
    #[must_use]
    pub fn roster(&self) -> Vec<PeerRecord> {
        self.lock().roster.snapshot()
    }

    /// Number of requests still awaiting completion.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.lock().registry.len()
    }

    /// Update the status carried by subsequent heartbeats.
    ///
    /// No immediate publish; the next heartbeat picks it up.
    pub fn set_status(&self, status: impl Into<String>) {
        self.lock().status = status.into();
    }

    /// Connect to the session.
    ///
    /// Performs the transport connect, subscribes to the heartbeat topic,
    /// the broadcast topic, and this peer's addressed topic, and starts the
    /// heartbeat/dispatch task. Returns the stream of application messages
    /// addressed to this peer.
    ///
    /// # Errors
    ///
    /// Fails if the session is not disconnected or the transport refuses
    /// the connection or a subscription; the session is left disconnected
    /// in that case.
    pub async fn connect(&mut self) -> Result<mpsc::Receiver<IncomingMessage>, SessionError> {
        {
            let mut shared = self.lock();
            if shared.state != ConnectionState::Disconnected {
                return Err(SessionError::AlreadyConnected);
            }
            shared.state = ConnectionState::Connecting;
        }

        match self.establish().await {
            Ok(incoming) => {
                self.lock().state = ConnectionState::Connected;
                debug!(peer = %self.peer_id(), "Session connected");
                Ok(incoming)
            }
            Err(e) => {
                let _ = self.transport.disconnect().await;
                self.lock().state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<mpsc::Receiver<IncomingMessage>, SessionError> {
        let inbound = self.transport.connect().await?;

        let options = SubscribeOptions::default(); // QoS 1, no-local
        self.transport.subscribe(&self.topics.ping(), options).await?;
        self.transport
            .subscribe(&self.topics.broadcast(), options)
            .await?;
        self.transport
            .subscribe(&self.topics.direct(self.peer_id()), options)
            .await?;

        let (incoming_tx, incoming_rx) = mpsc::channel(self.config.incoming_capacity);

        let event_loop = EventLoop {
            transport: Arc::clone(&self.transport),
            factory: self.factory.clone(),
            topics: self.topics.clone(),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            incoming: incoming_tx,
        };
        self.event_task = Some(tokio::spawn(event_loop.run(inbound)));

        Ok(incoming_rx)
    }

    /// Disconnect from the session.
    ///
    /// Stops the heartbeat/dispatch task, cancels every outstanding waiter,
    /// and releases the transport. No waiter completion fires after this
    /// returns. Idempotent: disconnecting a disconnected session is a no-op.
    ///
    /// # Errors
    ///
    /// Surfaces transport disconnect failures; local cleanup has already
    /// happened by then.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Disconnected {
                return Ok(());
            }
            shared.state = ConnectionState::Disconnecting;
        }

        if let Some(task) = self.event_task.take() {
            task.abort();
            let _ = task.await;
        }

        {
            let mut shared = self.lock();
            shared.registry.cancel_all("session disconnected");
            shared.roster = Presence::new();
        }

        let result = self.transport.disconnect().await;
        self.lock().state = ConnectionState::Disconnected;
        debug!(peer = %self.peer_id(), "Session disconnected");

        result.map_err(SessionError::from)
    }

    /// Send an addressed request and return its completion handle.
    ///
    /// The completion resolves when the receiver acknowledges, or fails on
    /// expiry or disconnect.
    ///
    /// # Errors
    ///
    /// Fails if the session is not connected, the payload cannot be
    /// serialized, or the transport rejects the publish.
    pub async fn send_to_peer(
        &self,
        receiver_id: impl Into<PeerId>,
        kind: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Completion, SessionError> {
        self.ensure_connected()?;

        let receiver_id = receiver_id.into();
        let payload = serde_json::to_value(payload)
            .map_err(|e| SessionError::Protocol(ProtocolError::Encode(e)))?;

        let correlation_id = generate_id();
        let envelope =
            self.factory
                .new_request_with_id(correlation_id.clone(), payload, kind, receiver_id.clone());
        let data = codec::encode(&envelope)?;

        let completion = {
            let mut shared = self.lock();
            shared.registry.register(
                correlation_id.clone(),
                HashSet::from([receiver_id.clone()]),
                CompletionPolicy::AnyOne,
            )?
        };

        let topic = self.topics.direct(&receiver_id);
        if let Err(e) = self
            .transport
            .publish(&topic, data, PublishOptions::default())
            .await
        {
            self.lock().registry.remove(&correlation_id);
            return Err(e.into());
        }

        trace!(correlation = %correlation_id, receiver = %receiver_id, "Sent request");
        Ok(completion)
    }

    /// Broadcast a request to every currently known peer.
    ///
    /// The completion resolves once every peer in the roster snapshot taken
    /// here has acknowledged; peers joining later are not awaited.
    ///
    /// # Errors
    ///
    /// Fails immediately with [`SessionError::NoReceivers`] when the roster
    /// is empty; nothing is registered or published in that case.
    pub async fn send_to_all(
        &self,
        kind: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Completion, SessionError> {
        self.ensure_connected()?;

        let payload = serde_json::to_value(payload)
            .map_err(|e| SessionError::Protocol(ProtocolError::Encode(e)))?;

        let correlation_id = generate_id();
        let envelope =
            self.factory
                .new_broadcast_request_with_id(correlation_id.clone(), payload, kind);
        let data = codec::encode(&envelope)?;

        let (completion, expected) = {
            let mut shared = self.lock();
            let expected = shared.roster.known_peers();
            let completion = shared.registry.register(
                correlation_id.clone(),
                expected.clone(),
                CompletionPolicy::AllExpected,
            )?;
            (completion, expected)
        };

        if let Err(e) = self
            .transport
            .publish(&self.topics.broadcast(), data, PublishOptions::default())
            .await
        {
            self.lock().registry.remove(&correlation_id);
            return Err(e.into());
        }

        trace!(correlation = %correlation_id, expected = expected.len(), "Sent broadcast request");
        Ok(completion)
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.lock().state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

/// The single serialized processing context: inbound transport deliveries
/// and heartbeat ticks both land here.
struct EventLoop<T: Transport> {
    transport: Arc<T>,
    factory: EnvelopeFactory,
    topics: Topics,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    incoming: mpsc::Sender<IncomingMessage>,
}

impl<T: Transport> EventLoop<T> {
    async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                delivery = inbound.recv() => match delivery {
                    Some(delivery) => self.handle_inbound(delivery).await,
                    None => {
                        debug!(peer = %self.factory.peer_id(), "Transport inbound stream ended");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    tick = tick.wrapping_add(1);
                    self.heartbeat().await;
                    if self.config.sweep_every_ticks > 0
                        && tick % u64::from(self.config.sweep_every_ticks) == 0
                    {
                        self.maintenance();
                    }
                }
            }
        }
    }

    async fn handle_inbound(&mut self, delivery: Inbound) {
        let Some(topic_kind) = self.topics.classify(&delivery.topic) else {
            warn!(topic = %delivery.topic, "Dropping delivery on unrecognized topic");
            return;
        };

        let envelope = match codec::decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(topic = %delivery.topic, error = %e, "Dropping malformed envelope");
                return;
            }
        };

        let self_id = self.factory.peer_id().to_string();

        match (topic_kind, envelope) {
            (
                TopicKind::Ping,
                Envelope::Ping {
                    peer_id,
                    last_seen_at,
                    status,
                },
            ) => {
                // Own heartbeats can still echo back if the transport does
                // not honor no-local.
                if peer_id != self_id {
                    self.lock().roster.observe(peer_id, last_seen_at, status);
                }
            }

            (
                TopicKind::Broadcast,
                Envelope::BroadcastRequest {
                    correlation_id,
                    sender_id,
                    kind,
                    payload,
                },
            ) => {
                if sender_id == self_id {
                    return;
                }
                self.acknowledge_to(&correlation_id, &sender_id).await;
                self.forward(IncomingMessage {
                    correlation_id,
                    sender_id,
                    kind,
                    payload,
                    broadcast: true,
                });
            }

            (
                TopicKind::Direct(target),
                Envelope::Request {
                    correlation_id,
                    sender_id,
                    receiver_id,
                    kind,
                    payload,
                },
            ) => {
                if target != self_id || receiver_id != self_id || sender_id == self_id {
                    warn!(
                        correlation = %correlation_id,
                        receiver = %receiver_id,
                        "Dropping misaddressed request"
                    );
                    return;
                }
                self.acknowledge_to(&correlation_id, &sender_id).await;
                self.forward(IncomingMessage {
                    correlation_id,
                    sender_id,
                    kind,
                    payload,
                    broadcast: false,
                });
            }

            (
                TopicKind::Direct(target),
                Envelope::Response {
                    correlation_id,
                    responder_id,
                },
            ) => {
                if target != self_id || responder_id == self_id {
                    return;
                }
                self.lock().registry.acknowledge(&correlation_id, &responder_id);
            }

            (topic_kind, envelope) => {
                warn!(
                    topic = %delivery.topic,
                    ?topic_kind,
                    envelope = ?envelope,
                    "Dropping envelope with unexpected shape for topic"
                );
            }
        }
    }

    /// Publish a `Response` back to the requester's addressed topic.
    ///
    /// Failures are contained: the requester's waiter will expire instead.
    async fn acknowledge_to(&self, correlation_id: &str, sender_id: &str) {
        let response = self.factory.new_response(correlation_id);
        let topic = self.topics.direct(sender_id);
        if let Err(e) = self.publish(&topic, &response).await {
            warn!(
                correlation = %correlation_id,
                sender = %sender_id,
                error = %e,
                "Failed to publish response"
            );
        }
    }

    fn forward(&self, message: IncomingMessage) {
        if self.incoming.try_send(message).is_err() {
            debug!("Dropping incoming message: application receiver gone or full");
        }
    }

    async fn heartbeat(&self) {
        let status = self.lock().status.clone();
        let ping = self.factory.new_ping(status);
        if let Err(e) = self.publish(&self.topics.ping(), &ping).await {
            warn!(error = %e, "Failed to publish heartbeat");
        }
    }

    fn maintenance(&self) {
        let mut shared = self.lock();
        let evicted = shared
            .roster
            .sweep(now_millis(), self.config.stale_after());
        let expired = shared
            .registry
            .expire(Instant::now(), self.config.request_timeout());
        drop(shared);

        if !evicted.is_empty() || !expired.is_empty() {
            debug!(
                evicted = evicted.len(),
                expired = expired.len(),
                "Maintenance pass"
            );
        }
    }

    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), SessionError> {
        let data = codec::encode(envelope)?;
        self.transport
            .publish(topic, data, PublishOptions::default())
            .await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_transport::MemoryBroker;

    fn config() -> SessionConfig {
        SessionConfig::new("chess", "game-1")
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let broker = MemoryBroker::new();
        let session = Session::new(broker.client("a"), config());

        let result = session.send_to_peer("b", "move", serde_json::json!({})).await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let broker = MemoryBroker::new();
        let mut session = Session::new(broker.client("a"), config());

        let _incoming = session.connect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);

        assert!(matches!(
            session.connect().await,
            Err(SessionError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let broker = MemoryBroker::new();
        let mut session = Session::new(broker.client("a"), config());

        assert!(session.disconnect().await.is_ok());

        let _incoming = session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_with_empty_roster() {
        let broker = MemoryBroker::new();
        let mut session = Session::new(broker.client("a"), config());
        let _incoming = session.connect().await.unwrap();

        let result = session.send_to_all("start", serde_json::json!({})).await;
        assert!(matches!(result, Err(SessionError::NoReceivers)));
        assert!(session.lock().registry.is_empty());
    }
}

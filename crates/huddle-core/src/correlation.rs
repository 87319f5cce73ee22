//! Correlation registry for outstanding requests.
//!
//! Every sent request registers a waiter keyed by correlation id. A waiter
//! completes once its policy is satisfied, or fails on expiry or
//! cancellation; either way it is removed exactly once and its completion
//! fires at most once.

use crate::error::SessionError;
use huddle_protocol::{CorrelationId, PeerId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rule determining when a waiter is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The first acknowledgment, from any responder, completes the waiter.
    AnyOne,
    /// Every expected responder must acknowledge.
    AllExpected,
}

/// Handle resolving when the corresponding request completes.
///
/// Resolves `Ok(())` on acknowledgment, or with the failure the registry
/// assigned (timeout, cancellation). Dropping the handle is fine; the
/// request itself is unaffected.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), SessionError>>,
}

impl Future for Completion {
    type Output = Result<(), SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SessionError::Canceled(
                "waiter dropped without completing".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// An in-flight request's bookkeeping.
#[derive(Debug)]
struct Waiter {
    created_at: Instant,
    expected: HashSet<PeerId>,
    acknowledged: HashSet<PeerId>,
    policy: CompletionPolicy,
    tx: oneshot::Sender<Result<(), SessionError>>,
}

impl Waiter {
    fn satisfied(&self) -> bool {
        match self.policy {
            CompletionPolicy::AnyOne => !self.acknowledged.is_empty(),
            CompletionPolicy::AllExpected => self.expected.is_subset(&self.acknowledged),
        }
    }
}

/// Registry of in-flight requests keyed by correlation id.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    waiters: HashMap<CorrelationId, Waiter>,
}

impl CorrelationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for a freshly sent request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoReceivers`] if `expected` is empty;
    /// nothing is registered in that case.
    pub fn register(
        &mut self,
        correlation_id: impl Into<CorrelationId>,
        expected: HashSet<PeerId>,
        policy: CompletionPolicy,
    ) -> Result<Completion, SessionError> {
        if expected.is_empty() {
            return Err(SessionError::NoReceivers);
        }

        let id = correlation_id.into();
        let (tx, rx) = oneshot::channel();

        debug!(correlation = %id, expected = expected.len(), ?policy, "Registered waiter");

        self.waiters.insert(
            id,
            Waiter {
                created_at: Instant::now(),
                expected,
                acknowledged: HashSet::new(),
                policy,
                tx,
            },
        );

        Ok(Completion { rx })
    }

    /// Record an acknowledgment for a correlation id.
    ///
    /// Unknown ids are silently dropped: late arrivals after expiry, and
    /// echoes of other peers' traffic, are expected under normal operation.
    /// Duplicate acknowledgments from the same responder are idempotent.
    ///
    /// Returns `true` if the waiter completed on this acknowledgment.
    pub fn acknowledge(&mut self, correlation_id: &str, responder_id: &str) -> bool {
        let Some(waiter) = self.waiters.get_mut(correlation_id) else {
            return false;
        };

        waiter.acknowledged.insert(responder_id.to_string());

        if !waiter.satisfied() {
            debug!(
                correlation = %correlation_id,
                responder = %responder_id,
                acknowledged = waiter.acknowledged.len(),
                expected = waiter.expected.len(),
                "Acknowledgment recorded, waiter still pending"
            );
            return false;
        }

        if let Some(waiter) = self.waiters.remove(correlation_id) {
            debug!(correlation = %correlation_id, "Waiter completed");
            let _ = waiter.tx.send(Ok(()));
        }
        true
    }

    /// Drop a waiter without firing its completion.
    ///
    /// Used to roll back a registration whose publish failed; the caller
    /// surfaces the failure directly.
    pub fn remove(&mut self, correlation_id: &str) -> bool {
        self.waiters.remove(correlation_id).is_some()
    }

    /// Fail every waiter older than `timeout`.
    ///
    /// Returns the expired correlation ids.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<CorrelationId> {
        let expired: Vec<CorrelationId> = self
            .waiters
            .iter()
            .filter(|(_, waiter)| now.duration_since(waiter.created_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(waiter) = self.waiters.remove(id) {
                warn!(correlation = %id, "Waiter expired before completion");
                let _ = waiter.tx.send(Err(SessionError::RequestTimeout));
            }
        }

        expired
    }

    /// Fail and remove every waiter with the given reason.
    pub fn cancel_all(&mut self, reason: &str) {
        for (id, waiter) in self.waiters.drain() {
            debug!(correlation = %id, reason = %reason, "Waiter canceled");
            let _ = waiter.tx.send(Err(SessionError::Canceled(reason.to_string())));
        }
    }

    /// Check whether a waiter exists for a correlation id.
    #[must_use]
    pub fn contains(&self, correlation_id: &str) -> bool {
        self.waiters.contains_key(correlation_id)
    }

    /// Number of in-flight waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(ids: &[&str]) -> HashSet<PeerId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_register_empty_receivers() {
        let mut registry = CorrelationRegistry::new();

        let result = registry.register("c1", HashSet::new(), CompletionPolicy::AllExpected);
        assert!(matches!(result, Err(SessionError::NoReceivers)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_any_one_completes_on_first_ack() {
        let mut registry = CorrelationRegistry::new();
        let completion = registry
            .register("c1", peers(&["bob"]), CompletionPolicy::AnyOne)
            .unwrap();

        // Any responder counts, not just the expected one.
        assert!(registry.acknowledge("c1", "carol"));
        assert!(!registry.contains("c1"));
        assert!(completion.await.is_ok());

        // Subsequent acknowledgments are no-ops.
        assert!(!registry.acknowledge("c1", "bob"));
    }

    #[tokio::test]
    async fn test_all_expected_requires_every_peer() {
        let mut registry = CorrelationRegistry::new();
        let completion = registry
            .register("c1", peers(&["a", "b", "c"]), CompletionPolicy::AllExpected)
            .unwrap();

        assert!(!registry.acknowledge("c1", "a"));
        assert!(!registry.acknowledge("c1", "a")); // duplicate, idempotent
        assert!(!registry.acknowledge("c1", "b"));
        assert!(registry.contains("c1"));

        assert!(registry.acknowledge("c1", "c"));
        assert!(!registry.contains("c1"));
        assert!(completion.await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_correlation_dropped() {
        let mut registry = CorrelationRegistry::new();
        assert!(!registry.acknowledge("nope", "a"));
    }

    #[tokio::test]
    async fn test_expire_fails_old_waiters() {
        let mut registry = CorrelationRegistry::new();
        let completion = registry
            .register("c1", peers(&["a"]), CompletionPolicy::AnyOne)
            .unwrap();

        let expired = registry.expire(
            Instant::now() + Duration::from_secs(60),
            Duration::from_secs(30),
        );
        assert_eq!(expired, vec!["c1".to_string()]);
        assert!(registry.is_empty());
        assert!(matches!(completion.await, Err(SessionError::RequestTimeout)));

        // A late acknowledgment does not revive the waiter.
        assert!(!registry.acknowledge("c1", "a"));
    }

    #[tokio::test]
    async fn test_expire_keeps_fresh_waiters() {
        let mut registry = CorrelationRegistry::new();
        let _completion = registry
            .register("c1", peers(&["a"]), CompletionPolicy::AnyOne)
            .unwrap();

        let expired = registry.expire(Instant::now(), Duration::from_secs(30));
        assert!(expired.is_empty());
        assert!(registry.contains("c1"));
    }

    #[tokio::test]
    async fn test_cancel_all_fails_every_waiter() {
        let mut registry = CorrelationRegistry::new();
        let c1 = registry
            .register("c1", peers(&["a"]), CompletionPolicy::AnyOne)
            .unwrap();
        let c2 = registry
            .register("c2", peers(&["a", "b"]), CompletionPolicy::AllExpected)
            .unwrap();

        registry.cancel_all("shutting down");
        assert!(registry.is_empty());

        assert!(matches!(c1.await, Err(SessionError::Canceled(_))));
        match c2.await {
            Err(SessionError::Canceled(reason)) => assert_eq!(reason, "shutting down"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_drops_without_firing() {
        let mut registry = CorrelationRegistry::new();
        let completion = registry
            .register("c1", peers(&["a"]), CompletionPolicy::AnyOne)
            .unwrap();

        assert!(registry.remove("c1"));
        assert!(!registry.remove("c1"));

        // The sender was dropped, not fired with a result.
        assert!(matches!(completion.await, Err(SessionError::Canceled(_))));
    }
}

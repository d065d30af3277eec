//! Tracking of in-flight requests so they can all be stopped at once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable registry of live request cancellation handles.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    live: Arc<Mutex<HashMap<u64, CancellationToken>>>,
    next_id: Arc<AtomicU64>,
    idle_notify: Arc<tokio::sync::Notify>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request. The handle is dropped from the registry with the guard.
    pub fn register(&self) -> RequestGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        self.live.lock().insert(id, token.clone());
        tracing::debug!(request_id = id, "Request registered");
        RequestGuard {
            id,
            token,
            registry: self.clone(),
        }
    }

    /// Cancel every outstanding request. Returns how many were cancelled.
    pub fn stop_all(&self) -> usize {
        let live = self.live.lock();
        for token in live.values() {
            token.cancel();
        }
        if !live.is_empty() {
            tracing::info!(count = live.len(), "Stopping all in-flight requests");
        }
        live.len()
    }

    /// Number of requests currently in flight.
    pub fn active_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether any request is in flight.
    pub fn is_running(&self) -> bool {
        self.active_count() > 0
    }

    /// Wait until no request is in flight.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, id: u64) {
        let mut live = self.live.lock();
        live.remove(&id);
        if live.is_empty() {
            self.idle_notify.notify_waiters();
        }
    }
}

/// Ownership of one registered request.
pub struct RequestGuard {
    id: u64,
    token: CancellationToken,
    registry: RequestRegistry,
}

impl RequestGuard {
    /// Registry-assigned request id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request's cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel only this request
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_are_tracked_until_dropped() {
        let registry = RequestRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.active_count(), 2);

        drop(a);
        assert_eq!(registry.active_count(), 1);
        drop(b);
        assert!(!registry.is_running());
    }

    #[test]
    fn test_stop_all_cancels_every_live_request() {
        let registry = RequestRegistry::new();
        let a = registry.register();
        let b = registry.register();

        assert_eq!(registry.stop_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());

        // Tokens registered afterwards start fresh
        let c = registry.register();
        assert!(!c.is_cancelled());
    }

    #[test]
    fn test_cancel_one_leaves_others_running() {
        let registry = RequestRegistry::new();
        let a = registry.register();
        let b = registry.register();
        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_for_idle_returns_after_last_guard_drops() {
        let registry = RequestRegistry::new();
        registry.wait_for_idle().await;

        let guard = registry.register();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_idle().await })
        };
        tokio::task::yield_now().await;
        drop(guard);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("idle wait timed out")
            .unwrap();
    }
}

//! Cancellation token management for running scans.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::select_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::identity::ScanIdentity;

/// Maps each running scan to the token that cancels its jobs.
#[derive(Debug, Default)]
pub struct ScanCancellationTracker {
    tokens: DashMap<ScanIdentity, CancellationToken>,
}

impl ScanCancellationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cancellation token for a scan.
    ///
    /// An existing registration is kept as is. Returns whether a new token was created.
    pub fn register_scan(&self, scan_id: Uuid, user_id: Uuid) -> bool {
        let identity = ScanIdentity::new(scan_id, user_id);
        match self.tokens.entry(identity) {
            Entry::Occupied(_) => {
                debug!(scan = %identity, "Scan already registered for cancellation");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(CancellationToken::new());
                true
            }
        }
    }

    /// Token for a scan, or an inert token that never fires when the scan is unknown.
    pub fn token_for_scan(&self, scan_id: Uuid, user_id: Uuid) -> CancellationToken {
        self.tokens
            .get(&ScanIdentity::new(scan_id, user_id))
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    /// Cancel a scan if it is registered.
    pub fn cancel_scan(&self, scan_id: Uuid, user_id: Uuid) -> bool {
        let identity = ScanIdentity::new(scan_id, user_id);
        if let Some((_, token)) = self.tokens.remove(&identity) {
            token.cancel();
            info!(scan = %identity, "Scan cancellation triggered");
            true
        } else {
            false
        }
    }

    /// Cancel every scan owned by a user, returning the cancelled identities.
    pub fn cancel_user_scans(&self, user_id: Uuid) -> Vec<ScanIdentity> {
        let mut cancelled = Vec::new();
        self.tokens.retain(|identity, token| {
            if identity.user_id == user_id {
                token.cancel();
                cancelled.push(*identity);
                false
            } else {
                true
            }
        });
        if !cancelled.is_empty() {
            info!(user_id = %user_id, count = cancelled.len(), "User scans cancelled");
        }
        cancelled
    }

    /// Remove a token without firing it, once a scan has finished on its own.
    pub fn unregister_scan(&self, scan_id: Uuid, user_id: Uuid) -> bool {
        self.tokens
            .remove(&ScanIdentity::new(scan_id, user_id))
            .is_some()
    }

    pub fn is_registered(&self, scan_id: Uuid, user_id: Uuid) -> bool {
        self.tokens
            .contains_key(&ScanIdentity::new(scan_id, user_id))
    }

    pub fn active_count(&self) -> usize {
        self.tokens.len()
    }

    /// Cancel and drop every registered scan.
    pub fn shutdown(&self) {
        let mut count = 0usize;
        self.tokens.retain(|_, token| {
            token.cancel();
            count += 1;
            false
        });
        if count > 0 {
            info!(count, "Cancelled remaining scans on shutdown");
        }
    }
}

impl Drop for ScanCancellationTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A token that fires as soon as any of its parents fires.
///
/// The link is held by a small watcher task. Dropping this value releases the
/// link without cancelling the derived token.
#[derive(Debug)]
pub struct LinkedCancellation {
    token: CancellationToken,
    release: CancellationToken,
}

impl LinkedCancellation {
    pub fn new(parents: &[&CancellationToken]) -> Self {
        let token = CancellationToken::new();
        let release = CancellationToken::new();

        if parents.iter().any(|parent| parent.is_cancelled()) {
            token.cancel();
            return Self { token, release };
        }
        if parents.is_empty() {
            return Self { token, release };
        }

        let watched: Vec<CancellationToken> = parents.iter().map(|p| (*p).clone()).collect();
        let linked = token.clone();
        let released = release.clone();
        tokio::spawn(async move {
            let any_parent = select_all(watched.iter().map(|parent| Box::pin(parent.cancelled())));
            tokio::select! {
                biased;
                _ = released.cancelled() => {}
                _ = any_parent => linked.cancel(),
            }
        });

        Self { token, release }
    }

    /// The derived token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for LinkedCancellation {
    fn drop(&mut self) {
        self.release.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn fires(token: &CancellationToken) -> bool {
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .is_ok()
    }

    #[test]
    fn test_duplicate_registration_keeps_original_token() {
        let tracker = ScanCancellationTracker::new();
        let (scan_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(tracker.register_scan(scan_id, user_id));
        let original = tracker.token_for_scan(scan_id, user_id);

        assert!(!tracker.register_scan(scan_id, user_id));
        assert_eq!(tracker.active_count(), 1);

        assert!(tracker.cancel_scan(scan_id, user_id));
        assert!(original.is_cancelled());
    }

    #[test]
    fn test_unknown_scan_gets_inert_token() {
        let tracker = ScanCancellationTracker::new();
        let token = tracker.token_for_scan(Uuid::new_v4(), Uuid::new_v4());
        assert!(!token.is_cancelled());
        tracker.shutdown();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancellation_isolation() {
        let tracker = ScanCancellationTracker::new();
        let user = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let (scan_a, scan_b, scan_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        tracker.register_scan(scan_a, user);
        tracker.register_scan(scan_b, user);
        tracker.register_scan(scan_c, other_user);
        let token_a = tracker.token_for_scan(scan_a, user);
        let token_b = tracker.token_for_scan(scan_b, user);
        let token_c = tracker.token_for_scan(scan_c, other_user);

        tracker.cancel_scan(scan_a, user);
        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
        assert!(!token_c.is_cancelled());

        let cancelled = tracker.cancel_user_scans(user);
        assert_eq!(cancelled, vec![ScanIdentity::new(scan_b, user)]);
        assert!(token_b.is_cancelled());
        assert!(!token_c.is_cancelled());
        assert!(tracker.is_registered(scan_c, other_user));
    }

    #[test]
    fn test_double_cancel_is_noop() {
        let tracker = ScanCancellationTracker::new();
        let (scan_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register_scan(scan_id, user_id);

        assert!(tracker.cancel_scan(scan_id, user_id));
        assert!(!tracker.cancel_scan(scan_id, user_id));
        assert!(!tracker.cancel_scan(Uuid::new_v4(), user_id));
    }

    #[test]
    fn test_unregister_does_not_cancel() {
        let tracker = ScanCancellationTracker::new();
        let (scan_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register_scan(scan_id, user_id);
        let token = tracker.token_for_scan(scan_id, user_id);

        assert!(tracker.unregister_scan(scan_id, user_id));
        assert!(!token.is_cancelled());
        assert!(!tracker.is_registered(scan_id, user_id));
    }

    #[test]
    fn test_drop_cancels_remaining_scans() {
        let tracker = ScanCancellationTracker::new();
        tracker.register_scan(Uuid::new_v4(), Uuid::new_v4());
        let (scan_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register_scan(scan_id, user_id);
        let token = tracker.token_for_scan(scan_id, user_id);

        drop(tracker);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_linked_token_fires_on_scan_cancel() {
        let shutdown = CancellationToken::new();
        let scan = CancellationToken::new();
        let linked = LinkedCancellation::new(&[&shutdown, &scan]);

        scan.cancel();
        assert!(fires(&linked.token()).await);
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_linked_token_fires_on_shutdown() {
        let shutdown = CancellationToken::new();
        let scan = CancellationToken::new();
        let linked = LinkedCancellation::new(&[&shutdown, &scan]);

        shutdown.cancel();
        assert!(fires(&linked.token()).await);
        assert!(!scan.is_cancelled());
    }

    #[tokio::test]
    async fn test_linked_token_ignores_other_scans() {
        let tracker = ScanCancellationTracker::new();
        let user = Uuid::new_v4();
        let (scan_a, scan_b) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register_scan(scan_a, user);
        tracker.register_scan(scan_b, user);

        let shutdown = CancellationToken::new();
        let token_a = tracker.token_for_scan(scan_a, user);
        let linked = LinkedCancellation::new(&[&shutdown, &token_a]);

        tracker.cancel_scan(scan_b, user);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!linked.is_cancelled());
    }

    #[tokio::test]
    async fn test_linked_token_from_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel();
        let linked = LinkedCancellation::new(&[&parent]);
        assert!(linked.is_cancelled());
    }

    #[tokio::test]
    async fn test_release_does_not_cancel() {
        let parent = CancellationToken::new();
        let linked = LinkedCancellation::new(&[&parent]);
        let token = linked.token();

        drop(linked);
        parent.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_register_and_user_cancel() {
        let tracker = Arc::new(ScanCancellationTracker::new());
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let mut registrations = Vec::new();
        for &user in &users {
            for _ in 0..16 {
                let tracker = tracker.clone();
                registrations.push(tokio::spawn(async move {
                    let scan_id = Uuid::new_v4();
                    assert!(tracker.register_scan(scan_id, user));
                    (scan_id, user, tracker.token_for_scan(scan_id, user))
                }));
            }
        }
        let mut tokens = Vec::new();
        for handle in registrations {
            tokens.push(handle.await.unwrap());
        }
        assert_eq!(tracker.active_count(), 128);

        // Half the users are cancelled while the other half keep registering
        let (cancelled_users, kept_users) = users.split_at(4);
        let cancels: Vec<_> = cancelled_users
            .iter()
            .map(|&user| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.cancel_user_scans(user).len() })
            })
            .collect();
        let registers: Vec<_> = kept_users
            .iter()
            .map(|&user| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for _ in 0..16 {
                        tracker.register_scan(Uuid::new_v4(), user);
                    }
                })
            })
            .collect();
        for handle in cancels {
            assert_eq!(handle.await.unwrap(), 16);
        }
        for handle in registers {
            handle.await.unwrap();
        }

        assert_eq!(tracker.active_count(), 4 * 32);
        for (scan_id, user, token) in tokens {
            let cancelled = cancelled_users.contains(&user);
            assert_eq!(token.is_cancelled(), cancelled);
            assert_eq!(tracker.is_registered(scan_id, user), !cancelled);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_cancels_fire_once() {
        for _ in 0..50 {
            let tracker = Arc::new(ScanCancellationTracker::new());
            let (scan_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
            tracker.register_scan(scan_id, user_id);
            let token = tracker.token_for_scan(scan_id, user_id);

            let by_scan = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.cancel_scan(scan_id, user_id) })
            };
            let by_user = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.cancel_user_scans(user_id).len() })
            };
            let by_scan = by_scan.await.unwrap() as usize;
            let by_user = by_user.await.unwrap();

            assert_eq!(by_scan + by_user, 1);
            assert!(token.is_cancelled());
            assert_eq!(tracker.active_count(), 0);
        }
    }
}

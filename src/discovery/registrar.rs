//! Lease-backed service registration.
//!
//! # Responsibilities
//! - Grant a lease and bind the service key to it
//! - Renew the lease in the background for the life of the handle
//! - Delete the key and revoke the lease on close
//!
//! # Design Decisions
//! - Registration failure is fatal; the caller must not serve undiscoverable
//! - Keepalive failures are reported on a bounded channel, never fatal;
//!   reports that find the buffer full are dropped
//! - One keepalive channel per lease, reopened only after it fails
//! - `close()` runs once; concurrent callers wait for it to finish

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::discovery::client::{DiscoveryClient, LeaseRenewal};
use crate::discovery::types::{KeepaliveFailure, LeaseId, RegistrationError, RegistrationResult};
use crate::observability::metrics;
use crate::resilience::{with_timeout, DiscoveryTimeouts};

/// Keepalive failures buffered until someone takes the receiver.
pub const KEEPALIVE_FAILURE_BUFFER: usize = 8;

/// Renewal period for a lease of `ttl_secs`: a third of the TTL.
pub fn keepalive_interval(ttl_secs: i64) -> Duration {
    Duration::from_millis((ttl_secs.max(1) as u64) * 1000 / 3)
}

/// An active registration in the discovery store.
pub struct RegistrationHandle<C: DiscoveryClient> {
    client: C,
    key: String,
    value: String,
    lease: LeaseId,
    ttl_secs: i64,
    request_timeout: Duration,
    closed: AtomicBool,
    closing: OnceCell<()>,
    stop_tx: watch::Sender<bool>,
    keepalive: AbortHandle,
    failures: Mutex<Option<mpsc::Receiver<KeepaliveFailure>>>,
}

/// Register `key -> value` under a fresh `ttl_secs` lease and start keepalive.
pub async fn register<C: DiscoveryClient>(
    client: C,
    key: impl Into<String>,
    value: impl Into<String>,
    ttl_secs: i64,
    timeouts: DiscoveryTimeouts,
) -> RegistrationResult<RegistrationHandle<C>> {
    let key = key.into();
    let value = value.into();

    let result = establish(&client, &key, &value, ttl_secs, timeouts.request).await;
    metrics::record_registration(result.is_ok());
    let lease = result?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let (failure_tx, failure_rx) = mpsc::channel(KEEPALIVE_FAILURE_BUFFER);
    let period = keepalive_interval(ttl_secs);
    let task = tokio::spawn(keepalive_loop(
        client.clone(),
        lease,
        period,
        timeouts.request,
        stop_rx,
        failure_tx,
    ));

    metrics::set_registered(true);
    tracing::info!(
        key = %key,
        value = %value,
        lease = %lease,
        ttl_secs,
        keepalive_ms = period.as_millis() as u64,
        "Service registered"
    );

    Ok(RegistrationHandle {
        client,
        key,
        value,
        lease,
        ttl_secs,
        request_timeout: timeouts.request,
        closed: AtomicBool::new(false),
        closing: OnceCell::new(),
        stop_tx,
        keepalive: task.abort_handle(),
        failures: Mutex::new(Some(failure_rx)),
    })
}

async fn establish<C: DiscoveryClient>(
    client: &C,
    key: &str,
    value: &str,
    ttl_secs: i64,
    timeout: Duration,
) -> RegistrationResult<LeaseId> {
    let lease = with_timeout("lease grant", timeout, client.grant_lease(ttl_secs)).await??;

    if let Err(e) = with_timeout("put", timeout, client.put_with_lease(key, value, lease))
        .await
        .map_err(RegistrationError::from)
        .and_then(|r| r)
    {
        tracing::warn!(key = %key, lease = %lease, error = %e, "Put failed, revoking lease");
        if let Ok(Err(revoke)) = with_timeout("lease revoke", timeout, client.revoke_lease(lease)).await {
            tracing::debug!(lease = %lease, error = %revoke, "Revoke after failed put also failed");
        }
        return Err(e);
    }

    Ok(lease)
}

async fn keepalive_loop<C: DiscoveryClient>(
    client: C,
    lease: LeaseId,
    period: Duration,
    request_timeout: Duration,
    mut stop: watch::Receiver<bool>,
    failures: mpsc::Sender<KeepaliveFailure>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive = 0u32;
    let mut renewal: Option<C::Renewal> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        let renewed = renew(&client, &mut renewal, lease, request_timeout).await;

        match renewed {
            Ok(ttl) if ttl > 0 => {
                if consecutive > 0 {
                    tracing::info!(lease = %lease, failures = consecutive, "Lease keepalive recovered");
                }
                consecutive = 0;
                metrics::record_keepalive(true);
                tracing::trace!(lease = %lease, ttl, "Lease renewed");
            }
            Ok(_) => {
                consecutive += 1;
                metrics::record_keepalive(false);
                metrics::set_registered(false);
                tracing::warn!(lease = %lease, "Lease expired; service is no longer discoverable");
                report(
                    &failures,
                    KeepaliveFailure {
                        lease,
                        error: RegistrationError::LeaseExpired(lease),
                        consecutive,
                    },
                );
                break;
            }
            Err(error) => {
                renewal = None;
                consecutive += 1;
                metrics::record_keepalive(false);
                tracing::warn!(lease = %lease, error = %error, failures = consecutive, "Lease keepalive failed");
                report(
                    &failures,
                    KeepaliveFailure {
                        lease,
                        error,
                        consecutive,
                    },
                );
            }
        }
    }

    tracing::debug!(lease = %lease, "Keepalive stopped");
}

/// Renew once over the open channel, opening one first if there is none.
async fn renew<C: DiscoveryClient>(
    client: &C,
    renewal: &mut Option<C::Renewal>,
    lease: LeaseId,
    timeout: Duration,
) -> RegistrationResult<i64> {
    let channel = match renewal.take() {
        Some(channel) => channel,
        None => with_timeout("keepalive open", timeout, client.open_keepalive(lease)).await??,
    };
    let channel = renewal.insert(channel);
    with_timeout("lease keepalive", timeout, channel.keep_alive()).await?
}

fn report(failures: &mpsc::Sender<KeepaliveFailure>, failure: KeepaliveFailure) {
    if let Err(mpsc::error::TrySendError::Full(dropped)) = failures.try_send(failure) {
        tracing::debug!(
            lease = %dropped.lease,
            consecutive = dropped.consecutive,
            "Keepalive failure buffer full, dropping report"
        );
    }
}

impl<C: DiscoveryClient> RegistrationHandle<C> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Take the receiver of keepalive failures. Only the first call gets it.
    ///
    /// At most [`KEEPALIVE_FAILURE_BUFFER`] reports wait in the channel.
    pub fn take_keepalive_failures(&self) -> Option<mpsc::Receiver<KeepaliveFailure>> {
        self.failures.lock().ok()?.take()
    }

    /// Stop keepalive, delete the key and revoke the lease.
    ///
    /// Only the first call does any work. Calls made while it runs wait for
    /// it, then return `Ok(())`, as do all later calls. Both the delete and
    /// the revoke are attempted even if one fails, and the first error is
    /// returned.
    pub async fn close(&self) -> RegistrationResult<()> {
        let mut outcome = None;
        let slot = &mut outcome;
        self.closing
            .get_or_init(move || async move {
                *slot = Some(self.deregister().await);
            })
            .await;

        match outcome {
            Some(result) => result,
            None => {
                tracing::debug!(key = %self.key, "Registration already closed");
                Ok(())
            }
        }
    }

    async fn deregister(&self) -> RegistrationResult<()> {
        self.closed.store(true, Ordering::Release);
        let _ = self.stop_tx.send(true);
        self.keepalive.abort();

        let deleted = with_timeout("delete", self.request_timeout, self.client.delete(&self.key))
            .await
            .map_err(RegistrationError::from)
            .and_then(|r| r);
        let revoked = with_timeout("lease revoke", self.request_timeout, self.client.revoke_lease(self.lease))
            .await
            .map_err(RegistrationError::from)
            .and_then(|r| r);

        metrics::set_registered(false);
        match (&deleted, &revoked) {
            (Ok(()), Ok(())) => tracing::info!(key = %self.key, lease = %self.lease, "Service deregistered"),
            _ => tracing::warn!(
                key = %self.key,
                lease = %self.lease,
                delete_error = ?deleted.as_ref().err(),
                revoke_error = ?revoked.as_ref().err(),
                "Deregistration incomplete; entry will expire with its lease"
            ),
        }

        deleted.and(revoked)
    }
}

impl<C: DiscoveryClient> Drop for RegistrationHandle<C> {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.keepalive.abort();
        tracing::warn!(key = %self.key, "Registration handle dropped without close");

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let key = std::mem::take(&mut self.key);
            let lease = self.lease;
            runtime.spawn(async move {
                let _ = client.delete(&key).await;
                let _ = client.revoke_lease(lease).await;
                metrics::set_registered(false);
            });
        }
    }
}

impl<C: DiscoveryClient> std::fmt::Debug for RegistrationHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("lease", &self.lease)
            .field("ttl_secs", &self.ttl_secs)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::memory::MemoryDiscovery;

    const KEY: &str = "svc1+10.0.0.5:7052";

    fn timeouts() -> DiscoveryTimeouts {
        DiscoveryTimeouts {
            connect: Duration::from_millis(500),
            request: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_keepalive_interval_is_third_of_ttl() {
        assert_eq!(keepalive_interval(3), Duration::from_secs(1));
        assert_eq!(keepalive_interval(5), Duration::from_millis(1666));
        assert_eq!(keepalive_interval(0), Duration::from_millis(333));
    }

    #[tokio::test]
    async fn test_register_then_close() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "10.0.0.5:7052", 5, timeouts()).await.unwrap();

        assert!(handle.is_open());
        assert_eq!(handle.key(), KEY);
        assert_eq!(store.lookup(KEY).as_deref(), Some("10.0.0.5:7052"));

        handle.close().await.unwrap();
        assert!(!handle.is_open());
        assert_eq!(store.lookup(KEY), None);
        assert!(!store.lease_alive(handle.lease()));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 5, timeouts()).await.unwrap();

        handle.close().await.unwrap();
        // Backend going away must not matter for the second call.
        store.set_reachable(false);
        handle.close().await.unwrap();

        store.set_reachable(true);
        assert_eq!(store.lookup(KEY), None);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_close_waits_for_first() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 5, timeouts()).await.unwrap();
        store.set_latency(Duration::from_millis(100));

        let (first, (second, seen_by_second)) = tokio::join!(handle.close(), async {
            tokio::task::yield_now().await;
            let result = handle.close().await;
            (result, store.lookup(KEY))
        });

        first.unwrap();
        second.unwrap();
        assert_eq!(seen_by_second, None);
    }

    #[tokio::test]
    async fn test_keepalive_reuses_one_channel() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(store.keepalive_count() >= 3);
        assert_eq!(store.renewal_streams(), 1);

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_reopens_channel_after_failure() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.renewal_streams(), 1);

        store.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        store.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(store.renewal_streams() >= 2);
        let _ = handle.close().await;
    }

    #[tokio::test]
    async fn test_untaken_keepalive_failures_stay_bounded() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();

        // Roughly a dozen failed renewals at a third of a second each.
        store.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(4200)).await;

        let mut failures = handle.take_keepalive_failures().unwrap();
        let mut queued = Vec::new();
        while let Ok(failure) = failures.try_recv() {
            queued.push(failure);
        }
        assert_eq!(queued.len(), KEEPALIVE_FAILURE_BUFFER);
        assert_eq!(queued[0].consecutive, 1);
        assert!(handle.is_open());

        store.set_reachable(true);
        let _ = handle.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_registration() {
        let store = MemoryDiscovery::new();
        store.set_reachable(false);

        let err = register(store.clone(), KEY, "v", 5, timeouts()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_keepalive_renews_lease() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();

        // Well past the 1s TTL; only renewals keep the key alive.
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(store.keepalive_count() >= 2);
        assert_eq!(store.lookup(KEY).as_deref(), Some("v"));

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_failures_are_reported() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();
        let mut failures = handle.take_keepalive_failures().unwrap();
        assert!(handle.take_keepalive_failures().is_none());

        store.set_reachable(false);
        let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failure.lease, handle.lease());
        assert_eq!(failure.consecutive, 1);
        assert!(matches!(failure.error, RegistrationError::Unreachable(_)));

        // The handle stays open; the process keeps running.
        assert!(handle.is_open());
        store.set_reachable(true);
        let _ = handle.close().await;
    }

    #[tokio::test]
    async fn test_expired_lease_ends_keepalive() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 1, timeouts()).await.unwrap();
        let mut failures = handle.take_keepalive_failures().unwrap();

        store.revoke_lease(handle.lease()).await.unwrap();
        let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(failure.error, RegistrationError::LeaseExpired(_)));

        // Sender dropped when the loop exits.
        assert!(failures.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_without_close_deregisters() {
        let store = MemoryDiscovery::new();
        let handle = register(store.clone(), KEY, "v", 5, timeouts()).await.unwrap();
        drop(handle);

        for _ in 0..50 {
            if store.lookup(KEY).is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("key still present after drop");
    }
}

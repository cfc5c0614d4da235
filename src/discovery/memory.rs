//! In-process discovery store.
//!
//! Models the lease semantics of etcd closely enough to exercise the
//! registrar without a cluster: keys bound to a lease vanish once the lease
//! outlives its TTL, and the whole store can be made unreachable.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::discovery::client::{DiscoveryClient, LeaseRenewal};
use crate::discovery::types::{LeaseId, RegistrationError, RegistrationResult};

#[derive(Debug)]
struct Lease {
    ttl_secs: i64,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

#[derive(Debug, Default)]
struct Inner {
    leases: DashMap<LeaseId, Lease>,
    keys: DashMap<String, Entry>,
    next_lease: AtomicI64,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
    keepalives: AtomicU64,
    renewal_streams: AtomicU64,
}

/// A discovery backend held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiscovery {
    inner: Arc<Inner>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the network were down.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Current value of `key`, bypassing reachability.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.expire();
        self.inner.keys.get(key).map(|e| e.value.clone())
    }

    /// Whether `lease` is still alive.
    pub fn lease_alive(&self, lease: LeaseId) -> bool {
        self.expire();
        self.inner.leases.contains_key(&lease)
    }

    /// Number of successful lease renewals.
    pub fn keepalive_count(&self) -> u64 {
        self.inner.keepalives.load(Ordering::SeqCst)
    }

    /// Number of keepalive channels opened.
    pub fn renewal_streams(&self) -> u64 {
        self.inner.renewal_streams.load(Ordering::SeqCst)
    }

    pub fn key_count(&self) -> usize {
        self.expire();
        self.inner.keys.len()
    }

    async fn check_reachable(&self) -> RegistrationResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(RegistrationError::Unreachable("memory store offline".to_string()));
        }
        self.expire();
        Ok(())
    }

    /// Drop expired leases and the keys bound to them.
    fn expire(&self) {
        let now = Instant::now();
        self.inner.leases.retain(|_, lease| lease.expires_at > now);
        let leases = &self.inner.leases;
        self.inner
            .keys
            .retain(|_, entry| entry.lease.map_or(true, |id| leases.contains_key(&id)));
    }
}

fn ttl_duration(ttl_secs: i64) -> Duration {
    Duration::from_secs(ttl_secs.max(0) as u64)
}

/// Renewal channel of one in-memory lease.
#[derive(Debug)]
pub struct MemoryRenewal {
    store: MemoryDiscovery,
    lease: LeaseId,
}

impl LeaseRenewal for MemoryRenewal {
    async fn keep_alive(&mut self) -> RegistrationResult<i64> {
        self.store.check_reachable().await?;
        match self.store.inner.leases.get_mut(&self.lease) {
            Some(mut entry) => {
                entry.expires_at = Instant::now() + ttl_duration(entry.ttl_secs);
                self.store.inner.keepalives.fetch_add(1, Ordering::SeqCst);
                Ok(entry.ttl_secs)
            }
            None => Ok(0),
        }
    }
}

impl DiscoveryClient for MemoryDiscovery {
    type Renewal = MemoryRenewal;

    async fn grant_lease(&self, ttl_secs: i64) -> RegistrationResult<LeaseId> {
        self.check_reachable().await?;
        let id = LeaseId(self.inner.next_lease.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.leases.insert(
            id,
            Lease {
                ttl_secs,
                expires_at: Instant::now() + ttl_duration(ttl_secs),
            },
        );
        Ok(id)
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease: LeaseId) -> RegistrationResult<()> {
        self.check_reachable().await?;
        if !self.inner.leases.contains_key(&lease) {
            return Err(RegistrationError::LeaseExpired(lease));
        }
        self.inner.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease: Some(lease),
            },
        );
        Ok(())
    }

    async fn open_keepalive(&self, lease: LeaseId) -> RegistrationResult<MemoryRenewal> {
        self.check_reachable().await?;
        self.inner.renewal_streams.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryRenewal {
            store: self.clone(),
            lease,
        })
    }

    async fn delete(&self, key: &str) -> RegistrationResult<()> {
        self.check_reachable().await?;
        self.inner.keys.remove(key);
        Ok(())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> RegistrationResult<()> {
        self.check_reachable().await?;
        self.inner.leases.remove(&lease);
        self.inner.keys.retain(|_, entry| entry.lease != Some(lease));
        Ok(())
    }
}

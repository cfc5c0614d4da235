//! The narrow interface the registrar needs from a discovery backend.

use std::future::Future;

use crate::discovery::types::{LeaseId, RegistrationResult};

/// A remote key/lease store.
///
/// Implementations are cheap to clone; clones share the same connection.
pub trait DiscoveryClient: Clone + Send + Sync + 'static {
    /// Renewal channel for one lease, see [`open_keepalive`](Self::open_keepalive).
    type Renewal: LeaseRenewal;

    /// Create a lease that expires after `ttl_secs` unless renewed.
    fn grant_lease(&self, ttl_secs: i64) -> impl Future<Output = RegistrationResult<LeaseId>> + Send;

    /// Write `key -> value`, removed automatically when `lease` expires.
    fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> impl Future<Output = RegistrationResult<()>> + Send;

    /// Open a renewal channel for `lease`, reused for every renewal until it fails.
    fn open_keepalive(&self, lease: LeaseId) -> impl Future<Output = RegistrationResult<Self::Renewal>> + Send;

    /// Remove `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = RegistrationResult<()>> + Send;

    /// Release `lease` and everything bound to it.
    fn revoke_lease(&self, lease: LeaseId) -> impl Future<Output = RegistrationResult<()>> + Send;
}

/// An open keepalive channel for a single lease.
pub trait LeaseRenewal: Send + 'static {
    /// Renew the lease once, returning its remaining TTL in seconds.
    ///
    /// A TTL of zero or less means the lease no longer exists.
    fn keep_alive(&mut self) -> impl Future<Output = RegistrationResult<i64>> + Send;
}

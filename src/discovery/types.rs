//! Discovery types and error definitions.

use thiserror::Error;

use crate::resilience::Elapsed;

/// Lease identifier issued by the discovery backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(pub i64);

impl From<i64> for LeaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<LeaseId> for i64 {
    fn from(id: LeaseId) -> Self {
        id.0
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Errors that can occur while registering or maintaining a registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// No discovery endpoint was configured.
    #[error("no discovery endpoints configured")]
    NoEndpoints,

    /// Could not connect to any endpoint.
    #[error("failed to connect to discovery endpoints {endpoints}: {source}")]
    Connect {
        endpoints: String,
        #[source]
        source: etcd_client::Error,
    },

    /// The etcd backend rejected or failed a request.
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    /// The backend could not be reached.
    #[error("discovery backend unreachable: {0}")]
    Unreachable(String),

    /// A backend call exceeded its deadline.
    #[error(transparent)]
    Timeout(#[from] Elapsed),

    /// The lease is gone; keys bound to it have been removed.
    #[error("lease {0} expired")]
    LeaseExpired(LeaseId),
}

/// Result type alias for discovery operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// A lease renewal that did not succeed, reported by the keepalive task.
#[derive(Debug)]
pub struct KeepaliveFailure {
    pub lease: LeaseId,
    pub error: RegistrationError,
    /// Failures in a row, including this one.
    pub consecutive: u32,
}

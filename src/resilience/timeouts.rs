//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap discovery backend calls with a deadline
//! - Carry connect and request timeouts for the etcd client
//! - Bound each shutdown step so the process cannot hang on exit
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A deadline that expired before the wrapped operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} timed out after {after:?}")]
pub struct Elapsed {
    pub operation: &'static str,
    pub after: Duration,
}

/// Run `fut` with a deadline, naming the operation in the error.
pub async fn with_timeout<F, T>(operation: &'static str, after: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Elapsed { operation, after })
}

/// Deadlines applied to the discovery client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTimeouts {
    /// Time allowed to establish a connection to an endpoint.
    pub connect: Duration,
    /// Time allowed for a single request (grant, put, delete, revoke).
    pub request: Duration,
}

impl Default for DiscoveryTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            request: Duration::from_secs(3),
        }
    }
}

impl DiscoveryTimeouts {
    pub fn from_secs(connect_secs: u64, request_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            request: Duration::from_secs(request_secs),
        }
    }
}

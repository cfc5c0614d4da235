//! etcd-backed discovery client.
//!
//! # Responsibilities
//! - Connect to the etcd cluster with bounded connect and request timeouts
//! - Map lease and key operations onto the etcd v3 API
//! - Keep one keepalive stream open per registered lease

use etcd_client::{Client, ConnectOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions};

use crate::discovery::client::{DiscoveryClient, LeaseRenewal};
use crate::discovery::types::{LeaseId, RegistrationError, RegistrationResult};
use crate::resilience::{with_timeout, DiscoveryTimeouts};

/// Discovery client talking to etcd.
#[derive(Clone)]
pub struct EtcdDiscovery {
    client: Client,
    endpoints: Vec<String>,
}

impl EtcdDiscovery {
    /// Connect to the given endpoints (e.g., "discovery:2379").
    pub async fn connect(endpoints: &[String], timeouts: DiscoveryTimeouts) -> RegistrationResult<Self> {
        if endpoints.is_empty() {
            return Err(RegistrationError::NoEndpoints);
        }

        let endpoints: Vec<String> = endpoints.iter().map(|e| with_scheme(e)).collect();
        let options = ConnectOptions::new()
            .with_connect_timeout(timeouts.connect)
            .with_timeout(timeouts.request);

        let budget = timeouts.connect + timeouts.request;
        let client = with_timeout("etcd connect", budget, Client::connect(&endpoints, Some(options)))
            .await?
            .map_err(|source| RegistrationError::Connect {
                endpoints: endpoints.join(","),
                source,
            })?;

        tracing::debug!(endpoints = ?endpoints, "etcd client connected");
        Ok(Self { client, endpoints })
    }
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Keepalive stream of one etcd lease.
pub struct EtcdRenewal {
    lease: LeaseId,
    keeper: LeaseKeeper,
    stream: LeaseKeepAliveStream,
}

impl LeaseRenewal for EtcdRenewal {
    async fn keep_alive(&mut self) -> RegistrationResult<i64> {
        self.keeper.keep_alive().await?;
        match self.stream.message().await? {
            Some(resp) => Ok(resp.ttl()),
            None => Err(RegistrationError::Unreachable(format!(
                "keepalive stream for lease {} closed",
                self.lease
            ))),
        }
    }
}

impl DiscoveryClient for EtcdDiscovery {
    type Renewal = EtcdRenewal;

    async fn grant_lease(&self, ttl_secs: i64) -> RegistrationResult<LeaseId> {
        let mut client = self.client.clone();
        let resp = client.lease_grant(ttl_secs, None).await?;
        Ok(LeaseId(resp.id()))
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease: LeaseId) -> RegistrationResult<()> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease.0)))
            .await?;
        Ok(())
    }

    async fn open_keepalive(&self, lease: LeaseId) -> RegistrationResult<EtcdRenewal> {
        let mut client = self.client.clone();
        let (keeper, stream) = client.lease_keep_alive(lease.0).await?;
        tracing::debug!(lease = %lease, "Opened keepalive stream");
        Ok(EtcdRenewal { lease, keeper, stream })
    }

    async fn delete(&self, key: &str) -> RegistrationResult<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> RegistrationResult<()> {
        let mut client = self.client.clone();
        client.lease_revoke(lease.0).await?;
        Ok(())
    }
}

impl std::fmt::Debug for EtcdDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdDiscovery")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

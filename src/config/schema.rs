//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the harness.
//! Values are assembled from flags and environment variables by
//! [`loader`](super::loader) and checked by [`validation`](super::validation).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use crate::resilience::DiscoveryTimeouts;

/// Lease TTL used when the operator does not override it.
pub const DEFAULT_LEASE_TTL_SECS: i64 = 5;

/// Root configuration for the harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Identity and advertised address of this instance.
    pub server: ServerConfig,

    /// TLS material locations.
    pub tls: TlsSettings,

    /// Discovery backend settings.
    pub discovery: DiscoverySettings,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Upper bound for each shutdown step, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tls: TlsSettings::default(),
            discovery: DiscoverySettings::default(),
            observability: ObservabilityConfig::default(),
            shutdown_timeout_secs: 5,
        }
    }
}

/// Identity of the served handler and the address it listens on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// Handler identity (chaincode id).
    pub service_id: String,

    /// Address advertised in discovery and bound by the listener (e.g., "10.0.0.5:7052").
    pub network_address: String,
}

/// Where to find TLS material, and whether to use it at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// TLS is off; key and cert paths are ignored.
    pub disabled: bool,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to the CA used to verify client certificates (PEM).
    pub client_ca_path: Option<PathBuf>,
}

/// Which discovery backend the registrar talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryBackend {
    #[default]
    Etcd,
    /// In-process store, for local runs without etcd.
    Memory,
}

/// Discovery registration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub backend: DiscoveryBackend,

    /// Backend endpoints (e.g., "discovery:2379").
    pub endpoints: Vec<String>,

    /// Prefix of the registration key; the key is `{prefix}+{network_address}`.
    pub key_prefix: String,

    pub lease_ttl_secs: i64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            backend: DiscoveryBackend::Etcd,
            endpoints: Vec::new(),
            key_prefix: String::new(),
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            connect_timeout_secs: 3,
            request_timeout_secs: 3,
        }
    }
}

impl DiscoverySettings {
    /// The key under which `network_address` is advertised.
    pub fn service_key(&self, network_address: &str) -> String {
        format!("{}+{}", self.key_prefix, network_address)
    }

    pub fn timeouts(&self) -> DiscoveryTimeouts {
        DiscoveryTimeouts::from_secs(self.connect_timeout_secs, self.request_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Prometheus scrape address; the exporter is off when unset.
    pub metrics_address: Option<SocketAddr>,
}

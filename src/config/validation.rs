//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (clap handles syntactic)
//! - Validate value ranges (TTL > 0, timeouts > 0)
//! - Check that the advertised address is a socket address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HarnessConfig → Result<(), Vec<ValidationError>>
//! - Runs before any file or network access

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{DiscoveryBackend, HarnessConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("network address {0:?} is not a valid socket address")]
    InvalidAddress(String),

    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: i64 },
}

/// Check a fully assembled configuration.
pub fn validate_config(config: &HarnessConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.service_id.is_empty() {
        errors.push(ValidationError::Empty("chaincode id"));
    }
    if config.server.network_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress(config.server.network_address.clone()));
    }

    let discovery = &config.discovery;
    if discovery.key_prefix.is_empty() {
        errors.push(ValidationError::Empty("discovery key prefix"));
    }
    if discovery.backend == DiscoveryBackend::Etcd
        && (discovery.endpoints.is_empty() || discovery.endpoints.iter().any(|e| e.is_empty()))
    {
        errors.push(ValidationError::Empty("discovery endpoint"));
    }
    if discovery.lease_ttl_secs <= 0 {
        errors.push(ValidationError::NotPositive {
            field: "lease TTL",
            value: discovery.lease_ttl_secs,
        });
    }
    for (field, value) in [
        ("connect timeout", discovery.connect_timeout_secs),
        ("request timeout", discovery.request_timeout_secs),
        ("shutdown timeout", config.shutdown_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field, value: 0 });
        }
    }

    if !config.tls.disabled {
        if config.tls.key_path.as_os_str().is_empty() {
            errors.push(ValidationError::Empty("TLS key path"));
        }
        if config.tls.cert_path.as_os_str().is_empty() {
            errors.push(ValidationError::Empty("TLS certificate path"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

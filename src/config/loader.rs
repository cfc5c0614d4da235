//! Configuration loading from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::config::schema::{
    DiscoveryBackend, DiscoverySettings, HarnessConfig, LogFormat, ObservabilityConfig, ServerConfig,
    TlsSettings, DEFAULT_LEASE_TTL_SECS,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::net::tls::TlsError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("TLS material: {0}")]
    Tls(#[from] TlsError),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Command-line flags, each falling back to an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "chaincode-harness")]
#[command(about = "Serve a chaincode and advertise it in service discovery", long_about = None)]
pub struct Args {
    /// Discovery endpoints, comma separated.
    #[arg(long, env = "ETCDADDRESS", default_value = "")]
    pub etcd_address: String,

    #[arg(long, env = "POD_IP", default_value = "")]
    pub pod_ip: String,

    #[arg(long, env = "POD_PORT", default_value = "")]
    pub pod_port: String,

    /// Identity of the served chaincode.
    #[arg(long, env = "CHAINCODE_ID", default_value = "")]
    pub chaincode_id: String,

    /// Discovery key prefix; defaults to the chaincode id.
    #[arg(long, env = "CHAINCODE_CCID", default_value = "")]
    pub chaincode_ccid: String,

    /// Boolean literal; anything unrecognised means TLS is on.
    #[arg(long, env = "CHAINCODE_TLS_DISABLED", default_value = "true")]
    pub tls_disabled: String,

    #[arg(long, env = "CHAINCODE_TLS_KEY", default_value = "")]
    pub tls_key: String,

    #[arg(long, env = "CHAINCODE_TLS_CERT", default_value = "")]
    pub tls_cert: String,

    #[arg(long, env = "CHAINCODE_CLIENT_CA_CERT", default_value = "")]
    pub client_ca_cert: String,

    #[arg(long, env = "DISCOVERY_BACKEND", value_enum, default_value_t = DiscoveryBackend::Etcd)]
    pub discovery_backend: DiscoveryBackend,

    #[arg(long, env = "DISCOVERY_LEASE_TTL_SECS", default_value_t = DEFAULT_LEASE_TTL_SECS)]
    pub lease_ttl_secs: i64,

    #[arg(long, env = "DISCOVERY_CONNECT_TIMEOUT_SECS", default_value_t = 3)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "DISCOVERY_REQUEST_TIMEOUT_SECS", default_value_t = 3)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,
}

/// Parse a boolean literal, returning `default` for anything unrecognised.
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`. Unparseable
/// input is not an error.
pub fn parse_bool_or_default(value: &str, default: bool) -> bool {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => true,
        "0" | "f" | "F" | "FALSE" | "false" | "False" => false,
        _ => default,
    }
}

/// Join the pod IP and port into the advertised address.
///
/// A port that already carries its `:` separator is appended as-is.
pub fn compose_network_address(ip: &str, port: &str) -> String {
    if port.starts_with(':') {
        format!("{ip}{port}")
    } else {
        format!("{ip}:{port}")
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

impl From<Args> for HarnessConfig {
    fn from(args: Args) -> Self {
        let network_address = compose_network_address(&args.pod_ip, &args.pod_port);
        let key_prefix = if args.chaincode_ccid.is_empty() {
            args.chaincode_id.clone()
        } else {
            args.chaincode_ccid
        };

        Self {
            server: ServerConfig {
                service_id: args.chaincode_id,
                network_address,
            },
            tls: TlsSettings {
                disabled: parse_bool_or_default(&args.tls_disabled, false),
                key_path: PathBuf::from(args.tls_key),
                cert_path: PathBuf::from(args.tls_cert),
                client_ca_path: optional_path(&args.client_ca_cert),
            },
            discovery: DiscoverySettings {
                backend: args.discovery_backend,
                endpoints: args
                    .etcd_address
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect(),
                key_prefix,
                lease_ttl_secs: args.lease_ttl_secs,
                connect_timeout_secs: args.connect_timeout_secs,
                request_timeout_secs: args.request_timeout_secs,
            },
            observability: ObservabilityConfig {
                log_format: args.log_format,
                metrics_address: args.metrics_address,
            },
            shutdown_timeout_secs: args.shutdown_timeout_secs,
        }
    }
}

/// Build and validate the configuration from parsed arguments.
pub fn load_config(args: Args) -> Result<HarnessConfig, ConfigError> {
    let config = HarnessConfig::from(args);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

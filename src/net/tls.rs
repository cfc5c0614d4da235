//! TLS material loading and rustls configuration.
//!
//! # Responsibilities
//! - Read key, certificate and client CA material from disk
//! - Refuse to start when TLS is requested but material is missing
//! - Build a rustls `ServerConfig` for the listener
//!
//! # Design Decisions
//! - Disabled TLS ignores key and cert paths, even missing ones
//! - Client CA loading is independent of server-side TLS enablement
//! - Material is kept as raw PEM bytes until the listener asks for a config

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::TlsSettings;

/// Errors raised while loading or assembling TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A material file could not be read.
    #[error("failed to read {what} from {path:?}: {source}")]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A material file was read but holds no bytes.
    #[error("{what} at {path:?} is empty")]
    Empty { what: &'static str, path: PathBuf },

    /// PEM content could not be parsed.
    #[error("invalid PEM in {what}: {source}")]
    Pem {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// No usable item of the expected kind was found in the PEM content.
    #[error("no {0} found in PEM material")]
    Missing(&'static str),

    /// rustls rejected the assembled configuration.
    #[error("rustls configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    /// The client certificate verifier could not be built.
    #[error("client verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// In-memory TLS material handed to the listener.
///
/// When `enabled` is false the key and cert are empty. The client CA is
/// carried either way, since it only governs peer verification.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsBundle {
    pub enabled: bool,
    pub key_bytes: Vec<u8>,
    pub cert_bytes: Vec<u8>,
    pub client_ca_cert_bytes: Option<Vec<u8>>,
}

impl std::fmt::Debug for TlsBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsBundle")
            .field("enabled", &self.enabled)
            .field("key_bytes", &format_args!("<{} bytes>", self.key_bytes.len()))
            .field("cert_bytes", &self.cert_bytes.len())
            .field(
                "client_ca_cert_bytes",
                &self.client_ca_cert_bytes.as_ref().map(Vec::len),
            )
            .finish()
    }
}

impl TlsBundle {
    /// A bundle with TLS switched off and no material.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether the peer is asked for a certificate.
    pub fn verifies_clients(&self) -> bool {
        self.client_ca_cert_bytes.is_some()
    }

    /// Drop the key material held in memory.
    pub fn release(&mut self) {
        self.key_bytes.fill(0);
        self.key_bytes.clear();
        self.cert_bytes.clear();
        self.client_ca_cert_bytes = None;
    }

    /// Build the rustls server configuration, or `None` when TLS is disabled.
    pub fn server_config(&self) -> Result<Option<ServerConfig>, TlsError> {
        if !self.enabled {
            return Ok(None);
        }

        let certs = parse_certs(&self.cert_bytes, "certificate")?;
        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut self.key_bytes.as_slice())
            .map_err(|source| TlsError::Pem { what: "private key", source })?
            .ok_or(TlsError::Missing("private key"))?;

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match &self.client_ca_cert_bytes {
            Some(ca_bytes) => {
                let mut roots = RootCertStore::empty();
                for cert in parse_certs(ca_bytes, "client CA certificate")? {
                    roots.add(cert)?;
                }
                let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build()?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut config = builder.with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Some(config))
    }
}

fn parse_certs(pem: &[u8], what: &'static str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem { what, source })?;
    if certs.is_empty() {
        return Err(TlsError::Missing(what));
    }
    Ok(certs)
}

async fn read_material(path: &Path, what: &'static str) -> Result<Vec<u8>, TlsError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        what,
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(TlsError::Empty { what, path: path.to_path_buf() });
    }
    Ok(bytes)
}

/// Load TLS material according to the operator's settings.
pub async fn load_tls_bundle(settings: &TlsSettings) -> Result<TlsBundle, TlsError> {
    let mut bundle = TlsBundle::disabled();

    if !settings.disabled {
        bundle.key_bytes = read_material(&settings.key_path, "TLS key").await?;
        bundle.cert_bytes = read_material(&settings.cert_path, "TLS certificate").await?;
        bundle.enabled = true;
    }

    if let Some(ca_path) = settings.client_ca_path.as_deref() {
        bundle.client_ca_cert_bytes = Some(read_material(ca_path, "client CA certificate").await?);
        if settings.disabled {
            tracing::warn!(path = ?ca_path, "Client CA loaded while TLS is disabled; peers will not be verified");
        }
    }

    tracing::info!(
        enabled = bundle.enabled,
        verify_clients = bundle.verifies_clients(),
        "TLS material loaded"
    );

    Ok(bundle)
}

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Key, certificate, client CA paths
//!     → tls.rs (read files, validate PEM)
//!     → TlsBundle (raw bytes, owned by the lifecycle manager)
//!     → rustls ServerConfig built by the handler on start
//! ```
//!
//! # Design Decisions
//! - TLS is optional; a disabled bundle carries no material
//! - Client certificates are required only when a client CA is given

pub mod tls;

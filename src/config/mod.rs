//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! flags / environment variables
//!     → loader.rs (clap parse, lenient boolean, address composition)
//!     → validation.rs (semantic checks)
//!     → HarnessConfig (validated, immutable)
//!     → owned by the lifecycle manager for the duration of startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Every flag has an environment fallback so the harness runs unchanged in a pod
//! - Validation separates syntactic (clap) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_bool_or_default, Args, ConfigError};
pub use schema::{
    DiscoveryBackend, DiscoverySettings, HarnessConfig, LogFormat, ObservabilityConfig, ServerConfig,
    TlsSettings,
};

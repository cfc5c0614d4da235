//! Chaincode service harness library.
//!
//! Runs an externally hosted chaincode: loads TLS material, registers the
//! service in etcd under a lease kept alive in the background, serves
//! through a pluggable [`Handler`], and deregisters on termination signals.

// Startup inputs
pub mod config;
pub mod net;

// Service plumbing
pub mod discovery;
pub mod handler;
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::HarnessConfig;
pub use error::HarnessError;
pub use handler::{Handler, ListenerError, RunningListener};
pub use http::HttpHandler;
pub use lifecycle::LifecycleManager;

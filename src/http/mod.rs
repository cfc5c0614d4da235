//! Default HTTP handler.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server, rustls when enabled)
//!     → server.rs (Axum router, trace layer)
//!     → handlers.rs (health, contract metadata)
//!     → caller-supplied contract routes
//! ```

pub mod handlers;
pub mod server;

pub use handlers::ContractInfo;
pub use server::HttpHandler;

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to discovery backend:
//!     → timeouts.rs (enforce connect/request deadline)
//!     → On expiry: surface a timeout error to the caller
//!
//! Shutdown step:
//!     → timeouts.rs (bound registrar close and listener drain)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries at this layer: startup failures are fatal and fast
//! - Restart policy belongs to the process supervisor

pub mod timeouts;

pub use timeouts::{with_timeout, DiscoveryTimeouts, Elapsed};

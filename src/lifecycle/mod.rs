//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Watch signals → Load TLS → Register in discovery → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Deregister → Release TLS → Stop listener → Done
//!
//! Signals (signals.rs):
//!     SIGHUP/SIGINT/SIGTERM → Trigger shutdown
//!     SIGQUIT, others → Logged, keep serving
//! ```
//!
//! # Design Decisions
//! - Ordered startup: TLS first, then discovery, then listener
//! - Ordered shutdown: deregister before the listener goes away
//! - Every shutdown step has a timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownReport, ShutdownState, ShutdownStep};
pub use signals::{OsSignals, ShutdownSignal, SignalSource};
pub use startup::LifecycleManager;

//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoints, key, value, TTL
//!     → etcd.rs (connect with connect/request timeouts)
//!     → registrar.rs (grant lease → put key → spawn keepalive)
//!     → RegistrationHandle (held by the lifecycle manager)
//!
//! On shutdown:
//!     RegistrationHandle::close → stop keepalive → delete key → revoke lease
//! ```
//!
//! # Design Decisions
//! - Backend access goes through the `DiscoveryClient` trait (etcd, in-memory)
//! - A lost lease makes the service undiscoverable; it never crashes the process
//! - All backend calls have deadlines

pub mod client;
pub mod etcd;
pub mod memory;
pub mod registrar;
pub mod types;

pub use client::{DiscoveryClient, LeaseRenewal};
pub use etcd::{EtcdDiscovery, EtcdRenewal};
pub use memory::{MemoryDiscovery, MemoryRenewal};
pub use registrar::{keepalive_interval, register, RegistrationHandle, KEEPALIVE_FAILURE_BUFFER};
pub use types::{KeepaliveFailure, LeaseId, RegistrationError, RegistrationResult};

//! The seam between the harness and the served business logic.
//!
//! # Responsibilities
//! - Define what the harness needs from a handler: start on an address with TLS material
//! - Represent a running listener that can be stopped and awaited
//!
//! # Design Decisions
//! - The harness never sees the handler's wire protocol
//! - Stopping is a request; the handler decides how to drain in-flight work

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::net::tls::{TlsBundle, TlsError};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address could not be parsed.
    #[error("invalid listen address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    /// The listener stopped with an I/O error while serving.
    #[error("failed while serving: {0}")]
    Serve(#[source] std::io::Error),

    /// TLS material could not be turned into a server configuration.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    /// The serving task panicked or was cancelled.
    #[error("listener task ended abnormally: {0}")]
    Crashed(String),
}

/// Request-serving logic hosted by the harness.
pub trait Handler: Send + Sync + 'static {
    /// Bind `address` and begin serving, using `tls` when it is enabled.
    ///
    /// Returns once the listener is accepting connections.
    fn start(
        &self,
        address: &str,
        tls: &TlsBundle,
    ) -> impl Future<Output = Result<RunningListener, ListenerError>> + Send;
}

/// A listener that has started serving.
#[derive(Debug)]
pub struct RunningListener {
    local_addr: Option<SocketAddr>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ListenerError>>>,
}

impl RunningListener {
    /// Wrap a serving task.
    ///
    /// The task must finish after a value (or a hang-up) arrives on the
    /// receiving end of `stop_tx`.
    pub fn new(
        local_addr: Option<SocketAddr>,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ListenerError>>,
    ) -> Self {
        Self {
            local_addr,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Address actually bound, when the handler reports one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Ask the listener to stop accepting new work.
    ///
    /// Returns false if a stop was already requested.
    pub fn stop(&mut self) -> bool {
        match self.stop_tx.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Whether the serving task has been observed to finish.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the serving task to end.
    ///
    /// Cancel-safe. Once the result has been returned, later calls return `Ok(())`.
    pub async fn wait(&mut self) -> Result<(), ListenerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(e) => Err(ListenerError::Crashed(e.to_string())),
        }
    }
}

impl Drop for RunningListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

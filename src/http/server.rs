//! HTTP handler served by the harness binary.
//!
//! # Responsibilities
//! - Create the Axum router (built-in routes plus caller-supplied ones)
//! - Bind with or without TLS depending on the bundle
//! - Stop gracefully when the harness asks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{Handler, ListenerError, RunningListener};
use crate::http::handlers::{self, ContractInfo};
use crate::net::tls::TlsBundle;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub server: ServerConfig,
    pub contract: Arc<ContractInfo>,
}

/// Serves an Axum router through `axum-server`.
pub struct HttpHandler {
    state: AppState,
    routes: Router,
    drain_timeout: Duration,
}

impl HttpHandler {
    pub fn new(server: ServerConfig, contract: ContractInfo) -> Self {
        Self {
            state: AppState {
                server,
                contract: Arc::new(contract),
            },
            routes: Router::new(),
            drain_timeout: Duration::from_secs(3),
        }
    }

    /// Add the routes that implement the served contract.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Time in-flight requests get to finish after a stop request.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(handlers::healthz))
            .route("/metadata", get(handlers::metadata))
            .with_state(self.state.clone())
            .merge(self.routes.clone())
            .layer(TraceLayer::new_for_http())
    }
}

impl Handler for HttpHandler {
    async fn start(&self, address: &str, tls: &TlsBundle) -> Result<RunningListener, ListenerError> {
        let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| {
            ListenerError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;
        let tls_config = tls.server_config()?;
        let app = self.build_router();

        let handle = axum_server::Handle::new();
        let serve_handle = handle.clone();
        let task = tokio::spawn(async move {
            let service = app.into_make_service();
            let served = match tls_config {
                Some(config) => {
                    axum_server::bind_rustls(addr, RustlsConfig::from_config(Arc::new(config)))
                        .handle(serve_handle)
                        .serve(service)
                        .await
                }
                None => axum_server::bind(addr).handle(serve_handle).serve(service).await,
            };
            served.map_err(ListenerError::Serve)
        });

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let stop_handle = handle.clone();
        let drain_timeout = self.drain_timeout;
        tokio::spawn(async move {
            if stop_rx.await.is_ok() {
                tracing::info!(drain_timeout = ?drain_timeout, "Listener stopping");
                stop_handle.graceful_shutdown(Some(drain_timeout));
            }
        });

        match handle.listening().await {
            Some(local_addr) => {
                tracing::info!(
                    address = %local_addr,
                    tls = tls.enabled,
                    verify_clients = tls.verifies_clients(),
                    "HTTP listener bound"
                );
                Ok(RunningListener::new(Some(local_addr), stop_tx, task))
            }
            None => match task.await {
                Ok(Err(ListenerError::Serve(e))) => Err(ListenerError::Bind(e)),
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(ListenerError::Bind(std::io::Error::other(
                    "listener exited before binding",
                ))),
                Err(e) => Err(ListenerError::Crashed(e.to_string())),
            },
        }
    }
}

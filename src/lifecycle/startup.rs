//! Startup orchestration.
//!
//! # Responsibilities
//! - Watch signals from the very start, so no termination is lost
//! - Load TLS material, then register with discovery
//! - Start the handler's listener and wait for shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing is retried
//! - Once registered, every exit path goes through the coordinator
//! - Listeners start last (traffic only when discoverable)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::{ConfigError, HarnessConfig};
use crate::discovery::{register, DiscoveryClient};
use crate::error::HarnessError;
use crate::handler::Handler;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownReport, ShutdownState};
use crate::lifecycle::signals::SignalSource;
use crate::net::tls::load_tls_bundle;

/// Runs one service instance from startup to deregistration.
pub struct LifecycleManager<H, C> {
    config: HarnessConfig,
    handler: H,
    client: C,
    coordinator: Arc<ShutdownCoordinator>,
}

impl<H: Handler, C: DiscoveryClient> LifecycleManager<H, C> {
    pub fn new(config: HarnessConfig, handler: H, client: C) -> Self {
        let step_timeout = Duration::from_secs(config.shutdown_timeout_secs);
        Self {
            config,
            handler,
            client,
            coordinator: Arc::new(ShutdownCoordinator::new(step_timeout)),
        }
    }

    /// The coordinator driving this instance's shutdown.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// Start serving and block until shutdown has completed.
    ///
    /// `signals` is owned by the watch task for the whole run and dropped
    /// once the shutdown sequence is done.
    pub async fn run<S: SignalSource>(self, signals: S) -> Result<ShutdownReport, HarnessError> {
        let triggered = self.coordinator.subscribe();
        let watcher = tokio::spawn(self.coordinator.clone().watch(signals));

        let result = self.serve(triggered).await;

        watcher.abort();
        let _ = watcher.await;
        tracing::debug!("Signal watch torn down");

        if let Err(e) = &result {
            tracing::error!(step = e.step(), error = %e, "Service lifecycle failed");
        }
        result
    }

    async fn serve(
        &self,
        mut triggered: broadcast::Receiver<ShutdownReason>,
    ) -> Result<ShutdownReport, HarnessError> {
        let coordinator = &self.coordinator;
        let server = &self.config.server;
        let discovery = &self.config.discovery;

        tracing::info!(
            service_id = %server.service_id,
            address = %server.network_address,
            "Starting service lifecycle"
        );

        let mut tls = load_tls_bundle(&self.config.tls).await.map_err(ConfigError::from)?;

        let registration = register(
            self.client.clone(),
            discovery.service_key(&server.network_address),
            server.network_address.clone(),
            discovery.lease_ttl_secs,
            discovery.timeouts(),
        )
        .await?;

        if coordinator.state() != ShutdownState::Armed {
            tracing::info!("Shutdown requested during registration, not starting listener");
            return Ok(coordinator.shutdown(Some(&registration), &mut tls, None).await);
        }

        let mut listener = match self.handler.start(&server.network_address, &tls).await {
            Ok(listener) => listener,
            Err(e) => {
                coordinator.trigger(ShutdownReason::ListenerFailed(e.to_string()));
                coordinator.shutdown(Some(&registration), &mut tls, None).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            address = %server.network_address,
            local_addr = ?listener.local_addr(),
            tls = tls.enabled,
            "Serving"
        );

        let mut listener_error = None;
        tokio::select! {
            _ = triggered.recv() => {}
            result = listener.wait() => {
                let reason = match result {
                    Ok(()) => ShutdownReason::ListenerStopped,
                    Err(e) => {
                        let reason = ShutdownReason::ListenerFailed(e.to_string());
                        listener_error = Some(e);
                        reason
                    }
                };
                coordinator.trigger(reason);
            }
        }

        let report = coordinator
            .shutdown(Some(&registration), &mut tls, Some(&mut listener))
            .await;

        match listener_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }
}

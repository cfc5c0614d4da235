//! Chaincode service harness.
//!
//! # Architecture Overview
//!
//! ```text
//!   flags / env ──▶ config ──▶ TLS bundle ──▶ discovery registration ──▶ handler listener
//!                                                  │  (lease + keepalive)        │
//!                                                  ▼                             ▼
//!                                             etcd cluster                  chaincode peers
//!
//!   SIGHUP/SIGINT/SIGTERM ──▶ shutdown coordinator
//!                               deregister ──▶ release TLS ──▶ stop listener ──▶ exit
//! ```

use std::process::ExitCode;

use clap::Parser;

use chaincode_harness::config::{load_config, Args, DiscoveryBackend};
use chaincode_harness::discovery::{EtcdDiscovery, MemoryDiscovery};
use chaincode_harness::error::HarnessError;
use chaincode_harness::http::{ContractInfo, HttpHandler};
use chaincode_harness::lifecycle::{LifecycleManager, OsSignals};
use chaincode_harness::observability::{logging, metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chaincode-harness starting");

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service_id = %config.server.service_id,
        address = %config.server.network_address,
        backend = ?config.discovery.backend,
        endpoints = ?config.discovery.endpoints,
        lease_ttl_secs = config.discovery.lease_ttl_secs,
        tls_disabled = config.tls.disabled,
        "Configuration loaded"
    );

    if let Some(addr) = config.observability.metrics_address {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, metrics_address = %addr, "Failed to start metrics exporter");
            return ExitCode::FAILURE;
        }
    }

    let signals = match OsSignals::subscribe() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let handler = HttpHandler::new(config.server.clone(), ContractInfo::erc721());

    let result = match config.discovery.backend {
        DiscoveryBackend::Etcd => {
            match EtcdDiscovery::connect(&config.discovery.endpoints, config.discovery.timeouts()).await {
                Ok(client) => LifecycleManager::new(config, handler, client).run(signals).await,
                Err(e) => Err(HarnessError::from(e)),
            }
        }
        DiscoveryBackend::Memory => {
            tracing::warn!("Using in-memory discovery; the service is not visible to peers");
            LifecycleManager::new(config, handler, MemoryDiscovery::new())
                .run(signals)
                .await
        }
    };

    match result {
        Ok(report) => {
            tracing::info!(
                reason = %report.reason,
                deregistered = report.deregistered(),
                "Shutdown complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(step = e.step(), error = %e, "chaincode-harness exiting");
            ExitCode::FAILURE
        }
    }
}

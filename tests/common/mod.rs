//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use chaincode_harness::config::{DiscoveryBackend, HarnessConfig};
use chaincode_harness::discovery::MemoryDiscovery;
use chaincode_harness::handler::{Handler, ListenerError, RunningListener};
use chaincode_harness::net::tls::TlsBundle;

/// Config for an instance registered against the in-memory backend, TLS off.
pub fn test_config(service_id: &str, address: &str) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.server.service_id = service_id.to_string();
    config.server.network_address = address.to_string();
    config.tls.disabled = true;
    config.discovery.backend = DiscoveryBackend::Memory;
    config.discovery.endpoints = vec!["memory".to_string()];
    config.discovery.key_prefix = service_id.to_string();
    config.discovery.connect_timeout_secs = 1;
    config.discovery.request_timeout_secs = 1;
    config.shutdown_timeout_secs = 2;
    config
}

/// What a [`RecordingHandler`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Listener started; whether the key was in discovery at that moment.
    Started { registered: bool, tls: bool },
    /// Stop requested; whether the key was still in discovery.
    Stopped { registered: bool },
}

/// Handler that checks discovery whenever it starts or stops.
#[derive(Clone)]
pub struct RecordingHandler {
    discovery: MemoryDiscovery,
    key: String,
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn new(discovery: MemoryDiscovery, key: impl Into<String>) -> Self {
        Self {
            discovery,
            key: key.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Started { .. }))
    }

    /// Poll until the listener has started.
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.started() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler never started");
    }
}

impl Handler for RecordingHandler {
    async fn start(&self, _address: &str, tls: &TlsBundle) -> Result<RunningListener, ListenerError> {
        self.events.lock().unwrap().push(Event::Started {
            registered: self.discovery.lookup(&self.key).is_some(),
            tls: tls.enabled,
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        let discovery = self.discovery.clone();
        let key = self.key.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            events.lock().unwrap().push(Event::Stopped {
                registered: discovery.lookup(&key).is_some(),
            });
            Ok(())
        });
        Ok(RunningListener::new(None, stop_tx, task))
    }
}

/// Handler whose listener can never bind.
pub struct FailingHandler;

impl Handler for FailingHandler {
    async fn start(&self, address: &str, _tls: &TlsBundle) -> Result<RunningListener, ListenerError> {
        Err(ListenerError::Bind(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("{address} already in use"),
        )))
    }
}

/// Handler whose listener dies shortly after starting.
pub struct CrashingHandler;

impl Handler for CrashingHandler {
    async fn start(&self, _address: &str, _tls: &TlsBundle) -> Result<RunningListener, ListenerError> {
        let (stop_tx, _stop_rx) = oneshot::channel();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(ListenerError::Serve(std::io::Error::other("connection reset")))
        });
        Ok(RunningListener::new(None, stop_tx, task))
    }
}

/// Plain HTTP client. reqwest carries no crypto provider of its own here, so
/// the process default is set to the one the server uses.
pub fn http_client() -> reqwest::Client {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    reqwest::Client::new()
}

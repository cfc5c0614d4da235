//! Shutdown coordination for the harness.
//!
//! # State Machine
//! ```text
//! Armed ──(SIGHUP | SIGINT | SIGTERM | listener ended)──▶ ShuttingDown ──▶ Done
//!   ▲                                                        │
//!   └──(SIGQUIT, other: logged only)                          └─(repeat triggers ignored)
//! ```
//!
//! # Shutdown Order
//! 1. Close the discovery registration (bounded)
//! 2. Release TLS material
//! 3. Stop the listener and wait for it (bounded)

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::discovery::{DiscoveryClient, RegistrationHandle};
use crate::handler::RunningListener;
use crate::lifecycle::signals::{ShutdownSignal, SignalSource};
use crate::net::tls::TlsBundle;
use crate::observability::metrics;
use crate::resilience::with_timeout;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Armed = 0,
    ShuttingDown = 1,
    Done = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Armed,
            1 => Self::ShuttingDown,
            _ => Self::Done,
        }
    }
}

/// What started the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(ShutdownSignal),
    /// The listener failed to start or failed while serving.
    ListenerFailed(String),
    /// The listener ended on its own without an error.
    ListenerStopped,
}

impl ShutdownReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::ListenerFailed(_) => "listener_failed",
            Self::ListenerStopped => "listener_stopped",
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "received {signal}"),
            Self::ListenerFailed(e) => write!(f, "listener failed: {e}"),
            Self::ListenerStopped => f.write_str("listener stopped"),
        }
    }
}

/// One executed step of the shutdown sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownStep {
    Deregistered,
    DeregistrationFailed(String),
    DeregistrationTimedOut,
    TlsReleased,
    ListenerStopped,
    ListenerStopTimedOut,
}

/// The outcome of a completed shutdown, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub steps: Vec<ShutdownStep>,
}

impl ShutdownReport {
    /// Whether the discovery entry was removed.
    pub fn deregistered(&self) -> bool {
        self.steps.contains(&ShutdownStep::Deregistered)
    }
}

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that long-running tasks can subscribe to,
/// and guarantees the shutdown sequence starts at most once.
pub struct ShutdownCoordinator {
    state: AtomicU8,
    reason: Mutex<Option<ShutdownReason>>,
    ignored_signals: AtomicU64,
    step_timeout: Duration,
    tx: broadcast::Sender<ShutdownReason>,
}

impl ShutdownCoordinator {
    /// Create a coordinator whose shutdown steps are each bounded by `step_timeout`.
    pub fn new(step_timeout: Duration) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            state: AtomicU8::new(ShutdownState::Armed as u8),
            reason: Mutex::new(None),
            ignored_signals: AtomicU64::new(0),
            step_timeout,
            tx,
        }
    }

    /// Subscribe to the shutdown trigger.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The reason recorded by the trigger that won, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signals received that did not trigger shutdown.
    pub fn ignored_signals(&self) -> u64 {
        self.ignored_signals.load(Ordering::Relaxed)
    }

    /// Move from Armed to ShuttingDown.
    ///
    /// Returns true only for the caller that performed the transition.
    /// The reason lock is held across the transition, so any reader that
    /// sees a state past Armed also sees the winning reason.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        let won = self
            .state
            .compare_exchange(
                ShutdownState::Armed as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            *slot = Some(reason.clone());
        }
        drop(slot);

        if won {
            tracing::info!(reason = %reason, "Shutdown triggered");
            let _ = self.tx.send(reason);
        } else {
            tracing::debug!(reason = %reason, "Shutdown already in progress, ignoring trigger");
        }
        won
    }

    /// Consume signals from `source` until it closes or the task is aborted.
    pub async fn watch<S: SignalSource>(self: Arc<Self>, mut source: S) {
        while let Some(signal) = source.recv().await {
            if signal.triggers_shutdown() {
                let action = if self.trigger(ShutdownReason::Signal(signal)) {
                    "shutdown"
                } else {
                    "ignored"
                };
                metrics::record_signal(signal.name(), action);
            } else {
                self.ignored_signals.fetch_add(1, Ordering::Relaxed);
                metrics::record_signal(signal.name(), "ignored");
                tracing::info!(signal = %signal, "Received non-terminating signal, still serving");
            }
        }
        tracing::debug!("Signal source closed");
    }

    /// Run the shutdown sequence and move to Done.
    ///
    /// If nothing has triggered shutdown yet, records `ListenerStopped`.
    pub async fn shutdown<C: DiscoveryClient>(
        &self,
        registration: Option<&RegistrationHandle<C>>,
        tls: &mut TlsBundle,
        listener: Option<&mut RunningListener>,
    ) -> ShutdownReport {
        self.trigger(ShutdownReason::ListenerStopped);
        let reason = self.reason().unwrap_or(ShutdownReason::ListenerStopped);
        let mut steps = Vec::with_capacity(3);

        if let Some(registration) = registration {
            let step = match with_timeout("deregistration", self.step_timeout, registration.close()).await {
                Ok(Ok(())) => ShutdownStep::Deregistered,
                Ok(Err(e)) => {
                    tracing::error!(key = %registration.key(), error = %e, "Failed to deregister service");
                    ShutdownStep::DeregistrationFailed(e.to_string())
                }
                Err(e) => {
                    tracing::error!(key = %registration.key(), error = %e, "Deregistration timed out");
                    ShutdownStep::DeregistrationTimedOut
                }
            };
            steps.push(step);
        }

        tls.release();
        steps.push(ShutdownStep::TlsReleased);

        if let Some(listener) = listener {
            listener.stop();
            let step = match with_timeout("listener stop", self.step_timeout, listener.wait()).await {
                Ok(result) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Listener ended with an error during shutdown");
                    }
                    ShutdownStep::ListenerStopped
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Listener did not stop in time");
                    ShutdownStep::ListenerStopTimedOut
                }
            };
            steps.push(step);
        }

        self.state.store(ShutdownState::Done as u8, Ordering::Release);
        metrics::record_shutdown(reason.label());
        tracing::info!(reason = %reason, steps = ?steps, "Shutdown sequence complete");

        ShutdownReport { reason, steps }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{register, MemoryDiscovery};
    use crate::resilience::DiscoveryTimeouts;
    use tokio::sync::mpsc;

    #[test]
    fn test_trigger_is_once() {
        let coordinator = ShutdownCoordinator::default();
        let mut rx = coordinator.subscribe();
        assert_eq!(coordinator.state(), ShutdownState::Armed);

        assert!(coordinator.trigger(ShutdownReason::Signal(ShutdownSignal::Terminate)));
        assert!(!coordinator.trigger(ShutdownReason::Signal(ShutdownSignal::Interrupt)));

        assert_eq!(coordinator.state(), ShutdownState::ShuttingDown);
        assert_eq!(
            coordinator.reason(),
            Some(ShutdownReason::Signal(ShutdownSignal::Terminate))
        );
        assert_eq!(rx.try_recv().unwrap(), ShutdownReason::Signal(ShutdownSignal::Terminate));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reason_visible_once_state_leaves_armed() {
        for _ in 0..200 {
            let coordinator = Arc::new(ShutdownCoordinator::default());
            let trigger = {
                let coordinator = coordinator.clone();
                std::thread::spawn(move || {
                    coordinator.trigger(ShutdownReason::Signal(ShutdownSignal::Terminate))
                })
            };

            while coordinator.state() == ShutdownState::Armed {
                std::hint::spin_loop();
            }
            assert_eq!(
                coordinator.reason(),
                Some(ShutdownReason::Signal(ShutdownSignal::Terminate))
            );
            assert!(trigger.join().unwrap());
        }
    }

    #[tokio::test]
    async fn test_watch_ignores_quit() {
        let coordinator = Arc::new(ShutdownCoordinator::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Quit).await.unwrap();
        tx.send(ShutdownSignal::Other(10)).await.unwrap();
        drop(tx);

        coordinator.clone().watch(rx).await;
        assert_eq!(coordinator.state(), ShutdownState::Armed);
        assert_eq!(coordinator.ignored_signals(), 2);
    }

    #[tokio::test]
    async fn test_watch_triggers_on_hangup() {
        let coordinator = Arc::new(ShutdownCoordinator::default());
        let mut triggered = coordinator.subscribe();
        let (tx, rx) = mpsc::channel(4);
        let watcher = tokio::spawn(coordinator.clone().watch(rx));

        tx.send(ShutdownSignal::Hangup).await.unwrap();
        assert_eq!(
            triggered.recv().await.unwrap(),
            ShutdownReason::Signal(ShutdownSignal::Hangup)
        );

        // Second signal while shutting down changes nothing.
        tx.send(ShutdownSignal::Terminate).await.unwrap();
        drop(tx);
        watcher.await.unwrap();
        assert_eq!(
            coordinator.reason(),
            Some(ShutdownReason::Signal(ShutdownSignal::Hangup))
        );
    }

    #[tokio::test]
    async fn test_shutdown_deregisters_before_stopping_listener() {
        let store = MemoryDiscovery::new();
        let registration = register(store.clone(), "svc1+a", "a", 5, DiscoveryTimeouts::default())
            .await
            .unwrap();
        let mut tls = TlsBundle {
            enabled: true,
            key_bytes: b"key".to_vec(),
            cert_bytes: b"cert".to_vec(),
            client_ca_cert_bytes: None,
        };

        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let observer = store.clone();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            let _ = seen_tx.send(observer.lookup("svc1+a"));
            Ok(())
        });
        let mut listener = RunningListener::new(None, stop_tx, task);

        let coordinator = ShutdownCoordinator::default();
        coordinator.trigger(ShutdownReason::Signal(ShutdownSignal::Interrupt));
        let report = coordinator.shutdown(Some(&registration), &mut tls, Some(&mut listener)).await;

        assert_eq!(
            report.steps,
            vec![
                ShutdownStep::Deregistered,
                ShutdownStep::TlsReleased,
                ShutdownStep::ListenerStopped,
            ]
        );
        assert_eq!(seen_rx.await.unwrap(), None);
        assert!(tls.key_bytes.is_empty());
        assert_eq!(coordinator.state(), ShutdownState::Done);
        assert!(!registration.is_open());
    }

    #[tokio::test]
    async fn test_shutdown_without_trigger_records_listener_stopped() {
        let coordinator = ShutdownCoordinator::default();
        let mut tls = TlsBundle::disabled();
        let report = coordinator
            .shutdown::<MemoryDiscovery>(None, &mut tls, None)
            .await;

        assert_eq!(report.reason, ShutdownReason::ListenerStopped);
        assert_eq!(report.steps, vec![ShutdownStep::TlsReleased]);
        assert!(!report.deregistered());
    }
}

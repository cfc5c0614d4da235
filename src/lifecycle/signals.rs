//! OS signal handling.
//!
//! # Responsibilities
//! - Subscribe to termination signals (SIGHUP, SIGINT, SIGTERM, SIGQUIT)
//! - Translate signals to `ShutdownSignal` values
//! - Classify which ones trigger shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The subscription is an owned object, dropped when shutdown is done
//! - SIGHUP shuts down rather than reloading; configuration is fixed at startup

use std::future::Future;

use tokio::sync::mpsc;

/// A signal as seen by the shutdown coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
    /// Any other signal, by raw number.
    Other(i32),
}

impl ShutdownSignal {
    /// Whether receiving this signal starts the shutdown sequence.
    pub fn triggers_shutdown(&self) -> bool {
        matches!(self, Self::Hangup | Self::Interrupt | Self::Terminate)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
            Self::Other(_) => "other",
        }
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "signal {raw}"),
            named => f.write_str(named.name()),
        }
    }
}

/// A stream of signals.
pub trait SignalSource: Send + 'static {
    /// Wait for the next signal; `None` once the source is closed.
    fn recv(&mut self) -> impl Future<Output = Option<ShutdownSignal>> + Send;
}

impl SignalSource for mpsc::Receiver<ShutdownSignal> {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        mpsc::Receiver::recv(self).await
    }
}

impl SignalSource for mpsc::UnboundedReceiver<ShutdownSignal> {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}

/// Subscription to the process's termination signals.
#[cfg(unix)]
pub struct OsSignals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    /// Install handlers. From here on these signals no longer kill the process.
    pub fn subscribe() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let subscription = Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            user1: signal(SignalKind::user_defined1())?,
        };
        tracing::debug!("Subscribed to SIGHUP, SIGINT, SIGTERM, SIGQUIT, SIGUSR1");
        Ok(subscription)
    }
}

#[cfg(unix)]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            Some(()) = self.hangup.recv() => Some(ShutdownSignal::Hangup),
            Some(()) = self.interrupt.recv() => Some(ShutdownSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(ShutdownSignal::Terminate),
            Some(()) = self.quit.recv() => Some(ShutdownSignal::Quit),
            Some(()) = self.user1.recv() => {
                Some(ShutdownSignal::Other(SignalKind::user_defined1().as_raw_value()))
            }
            else => None,
        }
    }
}

/// Subscription to Ctrl-C, the only termination signal available here.
#[cfg(not(unix))]
pub struct OsSignals {
    _private: (),
}

#[cfg(not(unix))]
impl OsSignals {
    pub fn subscribe() -> std::io::Result<Self> {
        Ok(Self { _private: () })
    }
}

#[cfg(not(unix))]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ShutdownSignal::Interrupt),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                None
            }
        }
    }
}

impl Drop for OsSignals {
    fn drop(&mut self) {
        tracing::debug!("Signal subscription released");
    }
}

//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define harness metrics (registration, keepalive, signals, shutdown)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `harness_registrations_total` (counter): registration attempts by result
//! - `harness_keepalive_total` (counter): lease renewals by result
//! - `harness_registered` (gauge): 1 while the discovery entry is held
//! - `harness_signals_total` (counter): signals received by name and action
//! - `harness_shutdowns_total` (counter): shutdowns by reason
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels are static strings

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REGISTRATIONS_TOTAL: &str = "harness_registrations_total";
pub const KEEPALIVE_TOTAL: &str = "harness_keepalive_total";
pub const REGISTERED: &str = "harness_registered";
pub const SIGNALS_TOTAL: &str = "harness_signals_total";
pub const SHUTDOWNS_TOTAL: &str = "harness_shutdowns_total";

fn result_label(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_registration(success: bool) {
    counter!(REGISTRATIONS_TOTAL, "result" => result_label(success)).increment(1);
}

pub fn record_keepalive(success: bool) {
    counter!(KEEPALIVE_TOTAL, "result" => result_label(success)).increment(1);
}

pub fn set_registered(registered: bool) {
    gauge!(REGISTERED).set(if registered { 1.0 } else { 0.0 });
}

pub fn record_signal(signal: &'static str, action: &'static str) {
    counter!(SIGNALS_TOTAL, "signal" => signal, "action" => action).increment(1);
}

pub fn record_shutdown(reason: &'static str) {
    counter!(SHUTDOWNS_TOTAL, "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter() {
        record_registration(true);
        record_keepalive(false);
        set_registered(true);
        record_signal("SIGQUIT", "ignored");
        record_shutdown("signal");
        assert_eq!(result_label(false), "error");
    }
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `conditional_meta_responses_total` (counter): responses seen by a
//!   middleware instance, labelled by `instance` and `outcome`

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// What the interceptor did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Trigger absent or mismatched; nothing buffered.
    Passthrough,
    /// Metadata merged into a JSON body.
    Merged,
    /// Triggered, but the body was not JSON.
    NonJson,
    /// Triggered JSON body that could not be merged; original forwarded.
    MergeFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passthrough => "passthrough",
            Outcome::Merged => "merged",
            Outcome::NonJson => "non_json",
            Outcome::MergeFailed => "merge_failed",
        }
    }
}

/// Count one response for `instance`.
pub fn record_outcome(instance: &str, outcome: Outcome) {
    metrics::counter!(
        "conditional_meta_responses_total",
        "instance" => instance.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

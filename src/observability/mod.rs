//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Interceptor and server produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (per-instance response outcome counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Middleware instance name is attached to every event and metric
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

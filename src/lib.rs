//! Conditional JSON metadata middleware.
//!
//! When a request carries the configured trigger (`?include=meta` by
//! default), the downstream response is buffered and, if it is a JSON
//! object, the configured metadata keys are merged into its top level.
//! Everything else passes through untouched.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::{AppConfig, MetaConfig};
pub use http::{ConditionalMeta, ConditionalMetaLayer, HttpServer};
pub use lifecycle::Shutdown;

//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, timeout)
//!     → layer.rs (tower adapter)
//!     → interceptor.rs (trigger check)
//!         → capture.rs (buffer downstream body, forward head)
//!         → merge.rs (shallow JSON merge)
//!     → sink.rs (ResponseWriter → http::Response)
//!     → Send to client
//! ```

pub mod capture;
pub mod interceptor;
pub mod layer;
pub mod merge;
pub mod server;
pub mod sink;

pub use capture::{CapturedResponse, ResponseCapture};
pub use interceptor::{BuildError, ConditionalMeta, Interceptor};
pub use layer::{ConditionalMetaLayer, ConditionalMetaService};
pub use merge::{is_json_content_type, merge_metadata, MergeError};
pub use server::{HttpServer, ServerError};
pub use sink::{hijack, Handler, Hijack, ResponseSink, ResponseWriter, SinkError};

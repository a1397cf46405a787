//! Conditional metadata interceptor.
//!
//! # Responsibilities
//! - Decide per request whether the trigger query parameter matches
//! - Pass untriggered requests straight to the downstream handler
//! - Capture triggered responses, merge metadata into JSON bodies
//! - Fall back to the original body whenever the merge fails
//!
//! # Data Flow
//! ```text
//! request ──▶ is_triggered? ──no──▶ next.serve(req, sink)
//!                  │yes
//!                  ▼
//!        next.serve(req, ResponseCapture(sink))
//!                  │
//!                  ▼
//!        JSON content type? ──no──▶ sink.write(original)
//!                  │yes
//!                  ▼
//!        merge_metadata ──err──▶ sink.write(original)
//!                  │ok
//!                  ▼
//!        sink.write(merged)
//! ```

use std::sync::Arc;

use axum::http::{header::CONTENT_TYPE, Request, Uri};
use thiserror::Error;

use crate::config::MetaConfig;
use crate::http::capture::ResponseCapture;
use crate::http::merge::{is_json_content_type, merge_metadata};
use crate::http::sink::{Handler, ResponseSink};
use crate::observability::metrics::{self, Outcome};

/// Errors raised while wiring the middleware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("conditional meta: configuration is required")]
    MissingConfig,

    #[error("conditional meta: downstream handler is required")]
    MissingHandler,

    #[error("conditional meta: instance name must not be empty")]
    EmptyName,
}

/// Per-request decision and post-processing, shared by every request.
#[derive(Debug, Clone)]
pub struct Interceptor {
    config: Arc<MetaConfig>,
    name: Arc<str>,
}

impl Interceptor {
    /// Create an interceptor; empty config fields fall back to defaults.
    pub fn new(config: MetaConfig, name: impl Into<String>) -> Result<Self, BuildError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BuildError::EmptyName);
        }

        Ok(Self {
            config: Arc::new(config.normalized()),
            name: name.into(),
        })
    }

    pub fn config(&self) -> &MetaConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the first `query_param` value in `uri` equals `query_value`.
    pub fn is_triggered(&self, uri: &Uri) -> bool {
        let Some(query) = uri.query() else {
            return false;
        };

        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.config.query_param.as_str())
            .is_some_and(|(_, value)| value == self.config.query_value.as_str())
    }

    /// Count a request that bypasses the capture entirely.
    pub fn record_passthrough(&self) {
        metrics::record_outcome(&self.name, Outcome::Passthrough);
    }

    /// Serve `req` through `next`, enriching the response when triggered.
    pub fn intercept(&self, req: &Request<()>, sink: &mut dyn ResponseSink, next: &dyn Handler) {
        if !self.is_triggered(req.uri()) {
            self.record_passthrough();
            next.serve(req, sink);
            return;
        }

        tracing::debug!(
            middleware = %self.name,
            path = %req.uri().path(),
            "Capturing response for metadata injection"
        );

        let mut capture = ResponseCapture::new(sink);
        next.serve(req, &mut capture);
        let captured = capture.finish();

        if !is_json_content_type(captured.headers.get(CONTENT_TYPE)) {
            metrics::record_outcome(&self.name, Outcome::NonJson);
            self.write_body(sink, &captured.body, "original");
            return;
        }

        match merge_metadata(&captured.body, &self.config.meta_data) {
            Ok(merged) => {
                metrics::record_outcome(&self.name, Outcome::Merged);
                self.write_body(sink, &merged, "modified");
            }
            Err(e) => {
                tracing::warn!(
                    middleware = %self.name,
                    error = %e,
                    "Error merging JSON metadata, forwarding original body"
                );
                metrics::record_outcome(&self.name, Outcome::MergeFailed);
                self.write_body(sink, &captured.body, "original");
            }
        }
    }

    fn write_body(&self, sink: &mut dyn ResponseSink, body: &[u8], kind: &'static str) {
        if let Err(e) = sink.write(body) {
            tracing::error!(
                middleware = %self.name,
                body = kind,
                error = %e,
                "Unable to write body"
            );
        }
    }
}

/// The interceptor bound to a downstream handler.
#[derive(Debug)]
pub struct ConditionalMeta<H> {
    interceptor: Interceptor,
    next: H,
}

impl<H: Handler> ConditionalMeta<H> {
    pub fn builder() -> Builder<H> {
        Builder::default()
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }
}

impl<H: Handler> Handler for ConditionalMeta<H> {
    fn serve(&self, req: &Request<()>, sink: &mut dyn ResponseSink) {
        self.interceptor.intercept(req, sink, &self.next);
    }
}

/// Builder for [`ConditionalMeta`]; every part is required.
#[derive(Debug)]
pub struct Builder<H> {
    next: Option<H>,
    config: Option<MetaConfig>,
    name: String,
}

impl<H> Default for Builder<H> {
    fn default() -> Self {
        Self {
            next: None,
            config: None,
            name: String::new(),
        }
    }
}

impl<H: Handler> Builder<H> {
    pub fn next(mut self, next: H) -> Self {
        self.next = Some(next);
        self
    }

    pub fn config(mut self, config: MetaConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self) -> Result<ConditionalMeta<H>, BuildError> {
        let config = self.config.ok_or(BuildError::MissingConfig)?;
        let next = self.next.ok_or(BuildError::MissingHandler)?;
        let interceptor = Interceptor::new(config, self.name)?;

        tracing::debug!(
            middleware = %interceptor.name,
            query_param = %interceptor.config.query_param,
            query_value = %interceptor.config.query_value,
            "Conditional meta middleware created"
        );

        Ok(ConditionalMeta { interceptor, next })
    }
}

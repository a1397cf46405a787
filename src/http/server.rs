//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (conditional metadata, timeout, tracing)
//! - Forward requests to the configured upstream
//! - Serve until the shutdown signal fires

use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{self, HeaderName},
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        HeaderMap, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::http::interceptor::BuildError;
use crate::http::layer::ConditionalMetaLayer;

/// Headers that describe a single hop and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Middleware(#[from] BuildError),

    #[error("invalid upstream address `{address}`: {source}")]
    InvalidUpstream {
        address: String,
        #[source]
        source: InvalidUri,
    },
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Authority,
    pub client: Client<HttpConnector, Body>,
}

/// Reverse proxy that enriches upstream responses.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig) -> Result<Self, ServerError> {
        let meta_layer = ConditionalMetaLayer::new(
            config.middleware.config.clone(),
            config.middleware.name.clone(),
        )?;

        let upstream = Authority::from_str(&config.upstream.address).map_err(|source| {
            ServerError::InvalidUpstream {
                address: config.upstream.address.clone(),
                source,
            }
        })?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { upstream, client };

        let router = Self::build_router(&config, state, meta_layer);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState, meta_layer: ConditionalMetaLayer) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(meta_layer)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            middleware = %self.config.middleware.name,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The fully layered router, for embedding or testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Forward the request to the upstream and stream its response back.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
        }
    };

    tracing::debug!(method = %parts.method, uri = %parts.uri, "Proxying request");

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.upstream, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

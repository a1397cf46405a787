//! Tower integration.
//!
//! [`ConditionalMetaLayer`] wraps any `Service<Request<Body>>` so the
//! interceptor can sit in an axum router like any other middleware.
//!
//! # Design Decisions
//! - Untriggered requests return the inner future as-is; the body streams
//! - Triggered responses are collected, then replayed through the
//!   interceptor into a [`ResponseWriter`]
//! - `101 Switching Protocols` is never buffered: the upgraded connection
//!   belongs to the downstream handler

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{header::CONTENT_LENGTH, HeaderMap, Request, Response, StatusCode},
    BoxError,
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::config::MetaConfig;
use crate::http::interceptor::{BuildError, Interceptor};
use crate::http::sink::{Handler, ResponseSink, ResponseWriter};

/// Layer that applies conditional metadata injection.
#[derive(Debug, Clone)]
pub struct ConditionalMetaLayer {
    interceptor: Arc<Interceptor>,
}

impl ConditionalMetaLayer {
    pub fn new(config: MetaConfig, name: impl Into<String>) -> Result<Self, BuildError> {
        let interceptor = Interceptor::new(config, name)?;
        Ok(Self {
            interceptor: Arc::new(interceptor),
        })
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }
}

impl<S> Layer<S> for ConditionalMetaLayer {
    type Service = ConditionalMetaService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConditionalMetaService {
            inner,
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

/// Service produced by [`ConditionalMetaLayer`].
#[derive(Debug, Clone)]
pub struct ConditionalMetaService<S> {
    inner: S,
    interceptor: Arc<Interceptor>,
}

impl<S, B> Service<Request<Body>> for ConditionalMetaService<S>
where
    S: Service<Request<Body>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if !self.interceptor.is_triggered(req.uri()) {
            self.interceptor.record_passthrough();
            let future = self.inner.call(req);
            return Box::pin(async move { Ok::<_, S::Error>(future.await?.map(Body::new)) });
        }

        // The clone may not be ready; swap so the ready one serves this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = Arc::clone(&self.interceptor);
        let head = request_head(&req);

        Box::pin(async move {
            let response = inner.call(req).await?;
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                return Ok(response.map(Body::new));
            }

            let (mut parts, body) = response.into_parts();
            let body = match axum::body::to_bytes(Body::new(body), usize::MAX).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(
                        middleware = %interceptor.name(),
                        error = %e,
                        "Failed to read downstream body"
                    );
                    parts.headers.remove(CONTENT_LENGTH);
                    return Ok(Response::from_parts(parts, Body::empty()));
                }
            };

            let replay = Replay {
                status: parts.status,
                headers: parts.headers,
                body,
            };
            let mut writer = ResponseWriter::new();
            interceptor.intercept(&head, &mut writer, &replay);

            let mut response = writer.into_response();
            *response.version_mut() = parts.version;
            *response.extensions_mut() = parts.extensions;
            Ok::<_, S::Error>(response)
        })
    }
}

/// Body-less copy of the request line and headers.
fn request_head(req: &Request<Body>) -> Request<()> {
    let mut head = Request::new(());
    *head.method_mut() = req.method().clone();
    *head.uri_mut() = req.uri().clone();
    *head.version_mut() = req.version();
    *head.headers_mut() = req.headers().clone();
    head
}

/// Downstream handler that re-emits an already collected response.
struct Replay {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Handler for Replay {
    fn serve(&self, _req: &Request<()>, sink: &mut dyn ResponseSink) {
        sink.headers_mut().extend(self.headers.clone());
        sink.send_head(self.status);
        if let Err(e) = sink.write(&self.body) {
            tracing::error!(error = %e, "Unable to replay downstream body");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::header::{CONTENT_LENGTH, CONTENT_TYPE},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use futures_util::{stream, FutureExt};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{json, Value};
    use std::{convert::Infallible, io};
    use tower::{service_fn, ServiceExt};

    fn app() -> Router {
        Router::new()
            .route(
                "/test",
                get(|| async { Json(json!({ "data": "test", "status": "ok" })) }),
            )
            .route("/text", get(|| async { "Hello, World!" }))
            .route(
                "/broken",
                get(|| async {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        [(CONTENT_TYPE, "application/json"), (CONTENT_LENGTH, "9")],
                        "{\"oops\": ",
                    )
                        .into_response()
                }),
            )
            .route(
                "/upgrade",
                get(|| async { StatusCode::SWITCHING_PROTOCOLS.into_response() }),
            )
            .layer(ConditionalMetaLayer::new(MetaConfig::default(), "layer-test").unwrap())
    }

    async fn send(uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let response = app()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        (parts.status, parts.headers, body)
    }

    #[tokio::test]
    async fn test_triggered_json_gets_metadata() {
        let (status, headers, body) = send("/test?include=meta").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({
                "data": "test",
                "status": "ok",
                "meta": { "route_name": "v2-translate" }
            })
        );
    }

    #[tokio::test]
    async fn test_untriggered_is_identical() {
        let (status, headers, body) = send("/test").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(&body[..], br#"{"data":"test","status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_triggered_text_untouched() {
        let (status, headers, body) = send("/text?include=meta").await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers[CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert_eq!(&body[..], b"Hello, World!");
    }

    #[tokio::test]
    async fn test_broken_json_keeps_status_and_body() {
        let (status, headers, body) = send("/broken?include=meta").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(headers[CONTENT_LENGTH], body.len().to_string());
        assert_eq!(&body[..], b"{\"oops\": ");
    }

    #[tokio::test]
    async fn test_rewritten_response_drops_stale_length() {
        let service = ConditionalMetaLayer::new(MetaConfig::default(), "layer-test")
            .unwrap()
            .layer(service_fn(|_req: Request<Body>| async {
                Ok::<_, Infallible>(
                    (
                        [(CONTENT_TYPE, "application/json"), (CONTENT_LENGTH, "9")],
                        r#"{"id": 7}"#,
                    )
                        .into_response(),
                )
            }));

        let response = service
            .oneshot(Request::get("/?include=meta").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["id"], 7);
        assert_eq!(body["meta"], json!({ "route_name": "v2-translate" }));
    }

    #[tokio::test]
    async fn test_failed_body_read_drops_length() {
        let service = ConditionalMetaLayer::new(MetaConfig::default(), "layer-test")
            .unwrap()
            .layer(service_fn(|_req: Request<Body>| async {
                let chunks = stream::iter([
                    Ok(Bytes::from_static(b"{\"a\":")),
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset")),
                ]);
                Ok::<_, Infallible>(
                    (
                        StatusCode::OK,
                        [(CONTENT_TYPE, "application/json"), (CONTENT_LENGTH, "12")],
                        Body::from_stream(chunks),
                    )
                        .into_response(),
                )
            }));

        let response = service
            .oneshot(Request::get("/?include=meta").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_outcomes_counted_for_untriggered_and_triggered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let service = ConditionalMetaLayer::new(MetaConfig::default(), "counted")
            .unwrap()
            .layer(service_fn(|_req: Request<Body>| async {
                Ok::<_, Infallible>(Json(json!({ "ok": true })).into_response())
            }));

        ::metrics::with_local_recorder(&recorder, || {
            for uri in ["/items", "/items?include=meta"] {
                let request = Request::get(uri).body(Body::empty()).unwrap();
                let response = service.clone().oneshot(request).now_or_never();
                assert!(matches!(response, Some(Ok(_))), "{uri}");
            }
        });

        let rendered = handle.render();
        let sample = |outcome: &str| {
            rendered.lines().any(|line| {
                line.starts_with("conditional_meta_responses_total{")
                    && line.contains(r#"instance="counted""#)
                    && line.contains(&format!(r#"outcome="{outcome}""#))
                    && line.ends_with(" 1")
            })
        };
        assert!(sample("passthrough"), "{rendered}");
        assert!(sample("merged"), "{rendered}");
    }

    #[tokio::test]
    async fn test_switching_protocols_passes_through() {
        let (status, _, body) = send("/upgrade?include=meta").await;

        assert_eq!(status, StatusCode::SWITCHING_PROTOCOLS);
        assert!(body.is_empty());
    }

    #[test]
    fn test_layer_rejects_empty_name() {
        assert_eq!(
            ConditionalMetaLayer::new(MetaConfig::default(), "").err(),
            Some(BuildError::EmptyName)
        );
    }
}

//! Response sink contract.
//!
//! A [`ResponseSink`] is where a [`Handler`] writes its response: a header
//! map that can be edited until the head is sent, a one-shot status, and an
//! append-only body. Connection hijacking is an optional capability exposed
//! through [`ResponseSink::hijacker`].
//!
//! [`ResponseWriter`] is the concrete sink handed out by the tower layer and
//! converts into an `http::Response` once the handler is done.

use axum::{
    body::Body,
    http::{HeaderMap, Request, Response, StatusCode},
};
use hyper::upgrade::OnUpgrade;
use thiserror::Error;

/// Errors raised by sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("the response sink does not support connection hijacking")]
    HijackUnsupported,

    #[error("the connection has been hijacked")]
    Hijacked,
}

/// Destination of a handler's response.
pub trait ResponseSink: Send {
    /// Headers that will be sent with the response head.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status line and headers. Only the first call has effect.
    fn send_head(&mut self, status: StatusCode);

    /// Append body bytes, committing a `200 OK` head first if needed.
    fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError>;

    /// The hijack capability, if this sink has one.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }
}

/// Capability to take over the underlying connection.
pub trait Hijack {
    /// Detach the connection from the HTTP exchange.
    ///
    /// The returned future resolves to the raw upgraded I/O once the
    /// switching response has been sent.
    fn hijack(&mut self) -> Result<OnUpgrade, SinkError>;
}

/// Hijack the connection behind `sink`, failing if it lacks the capability.
pub fn hijack(sink: &mut dyn ResponseSink) -> Result<OnUpgrade, SinkError> {
    sink.hijacker()
        .ok_or(SinkError::HijackUnsupported)?
        .hijack()
}

/// Something that writes a response for a request.
pub trait Handler: Send + Sync {
    fn serve(&self, req: &Request<()>, sink: &mut dyn ResponseSink);
}

impl<F> Handler for F
where
    F: Fn(&Request<()>, &mut dyn ResponseSink) + Send + Sync,
{
    fn serve(&self, req: &Request<()>, sink: &mut dyn ResponseSink) {
        self(req, sink)
    }
}

/// In-memory sink that assembles an `http::Response`.
///
/// Mirrors server semantics: header edits after the head is committed are
/// not part of the response, and a write without a head implies `200 OK`.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    upgradable: bool,
    upgrade: Option<OnUpgrade>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer that can hand its connection over via [`Hijack`].
    pub fn with_upgrade(upgrade: OnUpgrade) -> Self {
        Self {
            upgradable: true,
            upgrade: Some(upgrade),
            ..Self::default()
        }
    }

    /// Committed status, if the head has been sent.
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }

    /// Headers as committed with the head, or pending headers otherwise.
    pub fn sent_headers(&self) -> &HeaderMap {
        match &self.committed {
            Some((_, headers)) => headers,
            None => &self.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_hijacked(&self) -> bool {
        self.upgradable && self.upgrade.is_none()
    }

    pub fn into_response(self) -> Response<Body> {
        let (status, headers) = self
            .committed
            .unwrap_or((StatusCode::OK, self.headers));

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for ResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn send_head(&mut self, status: StatusCode) {
        if self.committed.is_some() {
            tracing::debug!(status = %status, "Ignoring superfluous send_head");
            return;
        }
        self.committed = Some((status, self.headers.clone()));
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        if self.is_hijacked() {
            return Err(SinkError::Hijacked);
        }
        self.send_head(StatusCode::OK);
        self.body.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.upgradable {
            Some(self)
        } else {
            None
        }
    }
}

impl Hijack for ResponseWriter {
    fn hijack(&mut self) -> Result<OnUpgrade, SinkError> {
        self.upgrade.take().ok_or(SinkError::Hijacked)
    }
}

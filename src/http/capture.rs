//! Response capture.
//!
//! [`ResponseCapture`] stands in for the real sink while the downstream
//! handler runs. Status and headers are forwarded as soon as the handler
//! commits them, but every body byte is held back in memory so the
//! interceptor can rewrite it afterwards.
//!
//! # Design Decisions
//! - `Content-Length` is dropped on forward; the final body size is only
//!   known after the rewrite and is framed by the real sink
//! - Headers already present on the real sink are inherited unless the
//!   downstream handler set the same name
//! - Hijacking is exposed only when the real sink can hijack
//! - The whole body is buffered; very large responses cost memory
//!   proportional to their size

use axum::http::{header::CONTENT_LENGTH, HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::http::sink::{Hijack, ResponseSink, SinkError};

/// What the downstream handler produced, minus the forwarded head.
#[derive(Debug)]
pub struct CapturedResponse {
    /// Headers as seen by the capture after forwarding.
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Sink adapter that forwards the head and buffers the body.
pub struct ResponseCapture<'a> {
    inner: &'a mut dyn ResponseSink,
    headers: HeaderMap,
    buffer: Vec<u8>,
    head_sent: bool,
}

impl<'a> ResponseCapture<'a> {
    pub fn new(inner: &'a mut dyn ResponseSink) -> Self {
        Self {
            inner,
            headers: HeaderMap::new(),
            buffer: Vec::new(),
            head_sent: false,
        }
    }

    pub fn head_sent(&self) -> bool {
        self.head_sent
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Close the capture, committing a default head if none was sent.
    pub fn finish(mut self) -> CapturedResponse {
        if !self.head_sent {
            self.send_head(StatusCode::OK);
        }
        CapturedResponse {
            headers: self.headers,
            body: self.buffer,
        }
    }

    fn inherit_headers(&mut self) {
        let inherited = self.inner.headers();
        for name in inherited.keys() {
            if self.headers.contains_key(name) {
                continue;
            }
            for value in inherited.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }
}

impl ResponseSink for ResponseCapture<'_> {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn send_head(&mut self, status: StatusCode) {
        if self.head_sent {
            return;
        }
        self.head_sent = true;

        self.inherit_headers();
        self.headers.remove(CONTENT_LENGTH);

        *self.inner.headers_mut() = self.headers.clone();
        self.inner.send_head(status);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        if !self.head_sent {
            self.send_head(StatusCode::OK);
        }
        self.buffer.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.hijacker().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Hijack for ResponseCapture<'_> {
    fn hijack(&mut self) -> Result<OnUpgrade, SinkError> {
        match self.inner.hijacker() {
            Some(hijacker) => hijacker.hijack(),
            None => Err(SinkError::HijackUnsupported),
        }
    }
}

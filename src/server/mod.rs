//! Server-side binding: handler parameters, the response sink, and the
//! error-to-HTTP-response mapping.
//!
//! A [`Server`] is a small bundle of error-rendering policy; handlers are
//! derived from user functions via [`Server::handle`] and friends (see the
//! `handle` submodule) or from a receiver value via [`Server::handlers`].
//!
//! [`ResponseSink`] is the in-memory response under construction. The first
//! write commits status and headers; once committed, later errors are
//! suppressed (the status line is already on the wire). JSON-returning
//! handlers run with the sink in JSON mode, where direct writes are refused
//! with a sentinel error so the encoded result stays the sole body.

mod handle;
mod handlers;

pub use handle::Handler;
pub use handlers::{HandlerSet, Methods};

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;

use crate::context::Context;
use crate::error::{codes, Error, RemoteError, Result};
use crate::marshal::CONTENT_TYPE_JSON;
use crate::path::PathVar;
use crate::unmarshal::IncomingRequest;

/// The per-request values passed to every handler.
///
/// Cloning is cheap; all handles refer to the same request state.
#[derive(Clone)]
pub struct Params {
    /// The response under construction.
    pub response: ResponseSink,
    /// The incoming request, body buffered and form parsed.
    pub request: Arc<IncomingRequest>,
    /// Path variables resolved by the router.
    pub path_vars: Vec<PathVar>,
    /// The matched path template, or empty for route-less handlers.
    pub path_pattern: String,
    /// Cancellation handle; cancelled when the handler returns.
    pub context: Context,
}

#[derive(Default)]
struct SinkState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
    json_mode: bool,
}

/// An in-memory HTTP response under construction.
///
/// Clones share state so a sink can live inside [`Params`] while the
/// handler wrapper retains its own handle. The sink is meant for one
/// request task at a time; the interior lock only keeps clones coherent,
/// it does not make concurrent writers meaningful.
#[derive(Clone, Default)]
pub struct ResponseSink {
    state: Arc<Mutex<SinkState>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit the status line. The first commit wins; later calls are
    /// ignored, as is any call inside a JSON-returning handler.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state.lock();
        if state.json_mode || state.committed {
            return;
        }
        state.status = Some(status);
        state.committed = true;
    }

    /// Append body bytes, committing the status line (200 if none was set)
    /// on first use.
    ///
    /// # Errors
    ///
    /// [`Error::ResponseWritten`] inside a JSON-returning handler.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.json_mode {
            return Err(Error::ResponseWritten);
        }
        if !state.committed {
            state.status.get_or_insert(StatusCode::OK);
            state.committed = true;
        }
        state.body.extend_from_slice(data);
        Ok(data.len())
    }

    /// Commit status and headers without writing a body.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if !state.json_mode && !state.committed {
            state.status.get_or_insert(StatusCode::OK);
            state.committed = true;
        }
    }

    /// Whether status and headers have been committed.
    pub fn committed(&self) -> bool {
        self.state.lock().committed
    }

    /// Mutate the response headers in place.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(&mut self.state.lock().headers)
    }

    /// Set a single header, replacing any previous value.
    pub fn set_header(&self, name: http::header::HeaderName, value: HeaderValue) {
        self.state.lock().headers.insert(name, value);
    }

    /// Snapshot the sink into a final response (status 200 when nothing was
    /// ever written).
    pub fn to_response(&self) -> http::Response<Bytes> {
        let state = self.state.lock();
        let mut response = http::Response::new(Bytes::from(state.body.clone()));
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = state.headers.clone();
        response
    }

    pub(crate) fn set_json_mode(&self, on: bool) {
        self.state.lock().json_mode = on;
    }

    /// Write a JSON response, bypassing JSON-mode write protection.
    pub(crate) fn write_json_bytes(&self, status: StatusCode, body: Vec<u8>) {
        let mut state = self.state.lock();
        state.json_mode = false;
        if !state.committed {
            state.status = Some(status);
            state.committed = true;
        }
        state
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        state.body.extend_from_slice(&body);
    }
}

/// JSON-encode `value` into the sink with the given status and an
/// `application/json` content type.
///
/// # Errors
///
/// Returns the serialization error without touching the sink.
pub fn write_json<T: Serialize>(sink: &ResponseSink, status: StatusCode, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value).map_err(|e| Error::msg(e.to_string()))?;
    sink.write_json_bytes(status, body);
    Ok(())
}

/// A JSON-encodable error body plus any extra headers, as produced by an
/// error mapper.
///
/// The body is serialized late, inside [`Server::write_error`], so encoding
/// failures can fall back to a synthetic 500.
pub struct ErrorResponse {
    body: Box<dyn ErasedBody + Send + Sync>,
    headers: HeaderMap,
}

trait ErasedBody {
    fn to_json(&self) -> std::result::Result<Vec<u8>, serde_json::Error>;
}

impl<T: Serialize> ErasedBody for T {
    fn to_json(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl ErrorResponse {
    pub fn new(body: impl Serialize + Send + Sync + 'static) -> Self {
        ErrorResponse {
            body: Box::new(body),
            headers: HeaderMap::new(),
        }
    }

    /// Attach extra response headers, e.g. authentication challenges.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Maps an error to a status and optional JSON body.
pub type ErrorMapper =
    Arc<dyn Fn(&Context, &Error) -> (StatusCode, Option<ErrorResponse>) + Send + Sync>;

/// Fully owns error rendering when configured; the mapper is not consulted.
pub type ErrorWriter = Arc<dyn Fn(&Context, &ResponseSink, &Error) + Send + Sync>;

/// Error-rendering policy shared by all handlers derived from it.
#[derive(Clone, Default)]
pub struct Server {
    error_mapper: Option<ErrorMapper>,
    error_writer: Option<ErrorWriter>,
}

impl Server {
    /// A server using the default error mapper (see [`Server::write_error`]).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the error mapper.
    pub fn with_error_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Context, &Error) -> (StatusCode, Option<ErrorResponse>) + Send + Sync + 'static,
    {
        self.error_mapper = Some(Arc::new(mapper));
        self
    }

    /// Replace error rendering wholesale. When set, the writer owns the
    /// entire error response and the mapper is ignored.
    pub fn with_error_writer<F>(mut self, writer: F) -> Self
    where
        F: Fn(&Context, &ResponseSink, &Error) + Send + Sync + 'static,
    {
        self.error_writer = Some(Arc::new(writer));
        self
    }

    /// Render `err` into the sink.
    ///
    /// The configured error writer, when present, owns rendering. Otherwise
    /// the mapper (default: remote-error code discovery over the cause
    /// chain, unmarshal errors as 400, everything unrecognized as 500)
    /// produces `(status, body)`; the body is JSON-encoded. A body that
    /// fails to encode is replaced by a synthetic 500 remote error naming
    /// the original.
    pub fn write_error(&self, ctx: &Context, sink: &ResponseSink, err: &Error) {
        if let Some(writer) = &self.error_writer {
            writer(ctx, sink, err);
            return;
        }
        let (status, body) = match &self.error_mapper {
            Some(mapper) => mapper(ctx, err),
            None => default_error_mapper(ctx, err),
        };
        let Some(response) = body else {
            sink.write_header(status);
            return;
        };
        match response.body.to_json() {
            Ok(bytes) => {
                sink.with_headers(|h| h.extend(response.headers.clone()));
                sink.write_json_bytes(status, bytes);
            }
            Err(encode_err) => {
                let fallback = RemoteError {
                    code: String::new(),
                    message: format!(
                        "cannot marshal error response {:?}: {}",
                        err.to_string(),
                        encode_err
                    ),
                    info: None,
                };
                let bytes = serde_json::to_vec(&fallback).unwrap_or_default();
                sink.write_json_bytes(StatusCode::INTERNAL_SERVER_ERROR, bytes);
            }
        }
    }
}

/// The default mapping: discover a remote-error code on the cause chain
/// (unmarshal errors count as `bad request`), translate it through the
/// code table, and echo the full error string as the message.
fn default_error_mapper(_ctx: &Context, err: &Error) -> (StatusCode, Option<ErrorResponse>) {
    let code = err.code();
    let status = code.map_or(StatusCode::INTERNAL_SERVER_ERROR, codes::status);
    let body = RemoteError {
        code: code.unwrap_or_default().to_string(),
        message: err.to_string(),
        info: None,
    };
    (status, Some(ErrorResponse::new(body)))
}

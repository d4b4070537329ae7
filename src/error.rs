//! Error types for httpbind.
//!
//! Errors fall into the layers described in the crate docs:
//!
//! - **Plan errors** ([`Error::BadType`]) - a record type's binding
//!   declarations are invalid. These are programmer errors, detected the
//!   first time a type is used and replayed for every later use.
//! - **Unmarshal errors** - an incoming request does not fit the record.
//!   [`Error::is_unmarshal`] classifies them so the default error mapper can
//!   answer 400 instead of 500.
//! - **Transport and decode errors** (client) - the executor failed, or the
//!   response could not be decoded. Decode failures carry a
//!   [`DecodeResponseError`] with a bounded snapshot of the offending body.
//! - **Remote errors** - the structured `{code, message}` JSON error
//!   exchanged between server and client.

use std::fmt;

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all httpbind operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding-plan construction failed for a record type.
    ///
    /// The message includes the offending field and tag so the mistake can
    /// be found without a debugger. Every marshal/unmarshal with the same
    /// type fails with the same diagnostic.
    #[error("bad type {type_name}: {message}")]
    BadType {
        /// Name of the record type the plan was built for.
        type_name: &'static str,
        /// What was wrong with the declarations.
        message: String,
    },

    /// A field value could not be encoded into its wire location.
    #[error("cannot marshal field: {0}")]
    MarshalField(String),

    /// A non-optional path parameter had no value.
    #[error("missing value for path parameter \"{0}\"")]
    MissingPathParam(String),

    /// The path template contains a bare `:` with no parameter name.
    #[error("empty path parameter")]
    EmptyPathParam,

    /// A catch-all value did not start with `/`.
    #[error("value {value:?} for path parameter \"*{name}\" does not start with required /")]
    CatchAllSlash {
        /// Catch-all parameter name.
        name: String,
        /// The offending encoded value.
        value: String,
    },

    /// A `*name` segment appeared before the end of the template.
    #[error("star path parameter is not at end of path")]
    StarNotAtEnd,

    /// A URL string could not be parsed.
    #[error("cannot parse {url:?}: {reason}")]
    InvalidUrl {
        /// The string that failed to parse.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The relative part given to the URL assembler carries a host.
    #[error("relative URL specifies a host")]
    RelativeUrlWithHost,

    /// Wrapper marking a request that could not be unmarshalled.
    #[error("cannot unmarshal parameters: {0}")]
    Unmarshal(#[source] Box<Error>),

    /// A single field of the destination record could not be populated.
    #[error("cannot unmarshal into field {field}: {source}")]
    UnmarshalField {
        /// Rust name of the record field.
        field: &'static str,
        /// Why the value could not be produced.
        source: Box<Error>,
    },

    /// A wire literal failed to parse into the field's scalar type.
    #[error("cannot parse {literal:?} into {target}: {reason}")]
    ParseValue {
        /// The literal text taken from the wire.
        literal: String,
        /// Target type name.
        target: &'static str,
        /// Parser diagnostic.
        reason: String,
    },

    /// The request form (query string or urlencoded body) was malformed.
    #[error("cannot parse HTTP request form: {0}")]
    BadForm(String),

    /// The request body could not be JSON-decoded.
    #[error("cannot unmarshal request body: {0}")]
    BadBody(String),

    /// The HTTP executor failed. The method and URL are kept in the message
    /// so the failing call can be identified from the error alone.
    #[error("{method} {url}: {source}")]
    Transport {
        /// Request method.
        method: http::Method,
        /// Request URL.
        url: String,
        /// Underlying error.
        source: Box<Error>,
    },

    /// Structured error decoded from a response (or built locally).
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A response body could not be decoded.
    #[error(transparent)]
    DecodeResponse(#[from] DecodeResponseError),

    /// A non-2xx response whose body could not be decoded as a remote error.
    #[error("cannot unmarshal error response (status {status}): {source}")]
    UnmarshalErrorResponse {
        /// Status line of the failing response.
        status: String,
        /// Why the error body could not be decoded.
        source: Box<Error>,
    },

    /// A non-2xx response for which the configured error decoder produced
    /// no error value.
    #[error("unexpected HTTP response status: {0}")]
    UnexpectedStatus(String),

    /// The server answered with a redirect the client did not ask for.
    #[error("unexpected redirect (status {status}) from {from:?} to {to:?}")]
    UnexpectedRedirect {
        /// Redirect status line.
        status: String,
        /// URL that was requested.
        from: String,
        /// Target of the `Location` header.
        to: String,
    },

    /// Sentinel returned by `ResponseSink::write` inside a JSON-returning
    /// handler, whose body is owned by the encoder.
    #[error("inappropriate call to response write in JSON-returning handler")]
    ResponseWritten,

    /// Free-form error message.
    #[error("{0}")]
    Message(String),

    /// Any other error, preserved as the cause chain.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// Wrap an arbitrary error, preserving it as the cause.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Other(Box::new(err))
    }

    /// Whether this error was caused by a request that could not be
    /// unmarshalled. The default error mapper turns these into 400s.
    pub fn is_unmarshal(&self) -> bool {
        match self {
            Error::Unmarshal(_)
            | Error::UnmarshalField { .. }
            | Error::ParseValue { .. }
            | Error::BadForm(_)
            | Error::BadBody(_) => true,
            Error::Transport { source, .. } => source.is_unmarshal(),
            _ => false,
        }
    }

    /// The remote-error code attached to this error, if any.
    ///
    /// Walks the cause chain looking for a [`RemoteError`]; unmarshal errors
    /// report [`codes::BAD_REQUEST`].
    pub fn code(&self) -> Option<&str> {
        if self.is_unmarshal() {
            return Some(codes::BAD_REQUEST);
        }
        match self {
            Error::Remote(re) => re.code(),
            Error::Transport { source, .. }
            | Error::Unmarshal(source)
            | Error::UnmarshalErrorResponse { source, .. } => source.code(),
            Error::UnmarshalField { source, .. } => source.code(),
            Error::Other(inner) => {
                let mut err: Option<&(dyn std::error::Error + 'static)> = Some(inner.as_ref());
                while let Some(e) = err {
                    if let Some(re) = e.downcast_ref::<RemoteError>() {
                        return re.code();
                    }
                    if let Some(nested) = e.downcast_ref::<Error>() {
                        return nested.code();
                    }
                    err = e.source();
                }
                None
            }
            _ => None,
        }
    }
}

/// Well-known remote-error codes and their HTTP status mapping.
pub mod codes {
    use http::StatusCode;

    pub const BAD_REQUEST: &str = "bad request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not found";
    pub const METHOD_NOT_ALLOWED: &str = "method not allowed";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "unsupported media type";
    pub const INTERNAL_SERVER_ERROR: &str = "internal server error";

    /// HTTP status for a remote-error code. Unrecognized codes map to 500.
    pub fn status(code: &str) -> StatusCode {
        match code {
            BAD_REQUEST => StatusCode::BAD_REQUEST,
            UNAUTHORIZED => StatusCode::UNAUTHORIZED,
            FORBIDDEN => StatusCode::FORBIDDEN,
            NOT_FOUND => StatusCode::NOT_FOUND,
            METHOD_NOT_ALLOWED => StatusCode::METHOD_NOT_ALLOWED,
            UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The structured error exchanged as JSON between server and client.
///
/// Wire shape: `{"code": "...", "message": "...", "info": ...}` with empty
/// fields omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Machine-readable code; see [`codes`] for the well-known values.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,

    /// Human-readable message, including any wrapping prefixes added along
    /// the way.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Optional opaque payload for error-specific detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl RemoteError {
    /// Create a remote error with the given code and message.
    ///
    /// An empty message defaults to the code, so the error always displays
    /// something useful.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let mut message = message.into();
        if message.is_empty() {
            message = code.clone();
        }
        RemoteError {
            code,
            message,
            info: None,
        }
    }

    /// The code, if one is set.
    pub fn code(&self) -> Option<&str> {
        if self.code.is_empty() {
            None
        } else {
            Some(&self.code)
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str("no error message set")
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for RemoteError {}

/// A response body that could not be decoded, with a bounded snapshot kept
/// for diagnostics.
///
/// The snapshot is truncated to the client's `max_error_body_size`, so a
/// misbehaving server cannot make the error itself unbounded.
#[derive(Debug)]
pub struct DecodeResponseError {
    /// Status of the response that failed to decode.
    pub status: StatusCode,
    /// Response `Content-Type`, if any.
    pub content_type: String,
    /// Truncated copy of the response body.
    pub body: Bytes,
    message: String,
}

impl DecodeResponseError {
    /// A response carried the wrong content type for a JSON decode.
    pub fn unexpected_content_type(status: StatusCode, content_type: &str, body: Bytes) -> Self {
        let message = format!(
            "unexpected content type {}; want application/json; content: {:?}",
            if content_type.is_empty() { "none" } else { content_type },
            String::from_utf8_lossy(&body),
        );
        DecodeResponseError {
            status,
            content_type: content_type.to_string(),
            body,
            message,
        }
    }

    /// A JSON body failed to decode into the target type.
    pub fn bad_json(
        status: StatusCode,
        content_type: &str,
        body: Bytes,
        err: &serde_json::Error,
    ) -> Self {
        DecodeResponseError {
            status,
            content_type: content_type.to_string(),
            body,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DecodeResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DecodeResponseError {}

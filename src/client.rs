//! Client - marshalling records into requests and decoding responses.
//!
//! The client never owns a socket: the HTTP round-trip is delegated to a
//! [`Doer`], so the binding layer stays deterministic and testable (the
//! integration tests wire a client directly to in-process handlers). A
//! `Doer` that overrides [`Doer::execute_with_context`] receives the
//! caller's cancellation handle; the default implementation ignores it and
//! delegates to [`Doer::execute`].
//!
//! Response handling:
//!
//! - 2xx: the decoding entry points (`call`, `call_url`, `do_request`,
//!   `get`) JSON-decode the body; the `_raw` variants hand the whole
//!   response to the caller, transferring ownership (dropping it is the
//!   close).
//! - 3xx with a `Location` header: an unexpected-redirect error.
//! - anything else: the error decoder runs; by default the body is decoded
//!   as a [`RemoteError`]. Bodies that fail to decode are captured in a
//!   [`DecodeResponseError`](crate::DecodeResponseError) with a snapshot
//!   truncated to `max_error_body_size`.
//!
//! Every error is prefixed with the request method and URL, so a failing
//! call can be identified from the error string alone.
//!
//! # Example
//!
//! ```no_run
//! use httpbind::{Client, Context, Doer};
//! # use httpbind::{Bindable, Field};
//! # #[derive(Default)]
//! # struct Req { p: String }
//! # impl Bindable for Req {
//! #     fn route() -> Option<&'static str> { Some("GET /m1/:p") }
//! #     fn fields() -> Vec<Field<Self>> {
//! #         vec![Field::text("p", ",path", |r: &Self| &r.p, |r, v| r.p = v)]
//! #     }
//! # }
//! # async fn example(executor: impl Doer + 'static) -> httpbind::Result<()> {
//! let client = Client::builder(executor)
//!     .base_url("http://localhost:8081")
//!     .build();
//! let resp: serde_json::Value = client
//!     .call(&Context::new(), &Req { p: "hello".into() })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::any::type_name;
use std::sync::Arc;

use bytes::Bytes;
use http::header::LOCATION;
use http::{Method, Request, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;

use crate::bind::Bindable;
use crate::context::Context;
use crate::error::{Error, RemoteError, Result};
use crate::marshal::{marshal, CONTENT_TYPE_JSON};
use crate::plan::plan_for;
use crate::unmarshal::media_type;
use crate::urls::append_url;
use crate::BoxFuture;

/// Default bound on the diagnostic body snapshot kept by decode errors.
pub const DEFAULT_MAX_ERROR_BODY_SIZE: usize = 1024;

/// The HTTP request executor abstraction.
///
/// Implementations return fully buffered responses; streaming and
/// connection management live behind this boundary.
pub trait Doer: Send + Sync {
    /// Execute the request.
    fn execute(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>>>;

    /// Execute the request, observing the caller's cancellation handle.
    ///
    /// The default implementation ignores the context; executors that can
    /// cancel work should override it, and the client always calls this
    /// variant.
    fn execute_with_context(
        &self,
        ctx: &Context,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>>> {
        let _ = ctx;
        self.execute(request)
    }
}

/// Pluggable decoder turning a non-2xx response into an error.
///
/// Returning `None` makes the client report the bare unexpected status.
pub type UnmarshalErrorFn = Arc<dyn Fn(&Response<Bytes>) -> Option<Error> + Send + Sync>;

/// Builder for [`Client`].
pub struct ClientBuilder {
    base_url: String,
    doer: Arc<dyn Doer>,
    unmarshal_error: Option<UnmarshalErrorFn>,
    max_error_body_size: usize,
}

impl ClientBuilder {
    pub fn new(doer: impl Doer + 'static) -> Self {
        ClientBuilder {
            base_url: String::new(),
            doer: Arc::new(doer),
            unmarshal_error: None,
            max_error_body_size: DEFAULT_MAX_ERROR_BODY_SIZE,
        }
    }

    /// Base URL resolved under every relative request URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Replace the error decoder for non-2xx responses.
    pub fn unmarshal_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> Option<Error> + Send + Sync + 'static,
    {
        self.unmarshal_error = Some(Arc::new(f));
        self
    }

    /// Bound the diagnostic body snapshot kept by decode errors.
    pub fn max_error_body_size(mut self, size: usize) -> Self {
        self.max_error_body_size = size;
        self
    }

    pub fn build(self) -> Client {
        Client {
            base_url: self.base_url,
            doer: self.doer,
            unmarshal_error: self.unmarshal_error,
            max_error_body_size: self.max_error_body_size,
        }
    }
}

/// A typed HTTP client over a pluggable executor.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    doer: Arc<dyn Doer>,
    unmarshal_error: Option<UnmarshalErrorFn>,
    max_error_body_size: usize,
}

impl Client {
    /// Start building a client around the given executor.
    pub fn builder(doer: impl Doer + 'static) -> ClientBuilder {
        ClientBuilder::new(doer)
    }

    /// Call the route declared by `R` and JSON-decode the response.
    pub async fn call<R, T>(&self, ctx: &Context, request: &R) -> Result<T>
    where
        R: Bindable,
        T: DeserializeOwned,
    {
        let (_, path) = route_of::<R>()?;
        self.call_url(ctx, &path, request).await
    }

    /// Call the route declared by `R`, returning the raw response.
    pub async fn call_raw<R: Bindable>(
        &self,
        ctx: &Context,
        request: &R,
    ) -> Result<Response<Bytes>> {
        let (_, path) = route_of::<R>()?;
        self.call_url_raw(ctx, &path, request).await
    }

    /// Call an explicit URL template (for records whose route tag names
    /// only a method) and JSON-decode the response.
    pub async fn call_url<R, T>(&self, ctx: &Context, url: &str, request: &R) -> Result<T>
    where
        R: Bindable,
        T: DeserializeOwned,
    {
        let request = self.build_request(url, request)?;
        let (method, url) = request_identity(&request);
        let response = self.round_trip(ctx, request).await?;
        self.decode_success(response)
            .map_err(|e| transport(&method, &url, e))
    }

    /// Call an explicit URL template, returning the raw response.
    pub async fn call_url_raw<R: Bindable>(
        &self,
        ctx: &Context,
        url: &str,
        request: &R,
    ) -> Result<Response<Bytes>> {
        let request = self.build_request(url, request)?;
        self.round_trip(ctx, request).await
    }

    /// Execute a prepared request and JSON-decode the response. A relative
    /// request URL is resolved against the base URL.
    pub async fn do_request<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        request: Request<Bytes>,
    ) -> Result<T> {
        let request = self.resolve(request)?;
        let (method, url) = request_identity(&request);
        let response = self.round_trip(ctx, request).await?;
        self.decode_success(response)
            .map_err(|e| transport(&method, &url, e))
    }

    /// Execute a prepared request, returning the raw response.
    pub async fn do_request_raw(
        &self,
        ctx: &Context,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let request = self.resolve(request)?;
        self.round_trip(ctx, request).await
    }

    /// GET a URL (absolute, or relative to the base URL) and JSON-decode
    /// the response.
    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, url: &str) -> Result<T> {
        self.do_request(ctx, get_request(url)?).await
    }

    /// GET a URL, returning the raw response.
    pub async fn get_raw(&self, ctx: &Context, url: &str) -> Result<Response<Bytes>> {
        self.do_request_raw(ctx, get_request(url)?).await
    }

    fn build_request<R: Bindable>(&self, url: &str, record: &R) -> Result<Request<Bytes>> {
        let plan = plan_for::<R>()?;
        let method = plan
            .route
            .as_ref()
            .map(|r| r.method.clone())
            .unwrap_or(Method::GET);
        let target = append_url(&self.base_url, url)?;
        marshal(&target, method, record)
    }

    fn resolve(&self, mut request: Request<Bytes>) -> Result<Request<Bytes>> {
        if request.uri().authority().is_some() || self.base_url.is_empty() {
            return Ok(request);
        }
        let target = append_url(&self.base_url, &request.uri().to_string())?;
        *request.uri_mut() = Uri::try_from(target.as_str()).map_err(|e| Error::InvalidUrl {
            url: target,
            reason: e.to_string(),
        })?;
        Ok(request)
    }

    /// Execute and classify the response; all errors carry the method and
    /// URL prefix.
    async fn round_trip(&self, ctx: &Context, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (method, url) = request_identity(&request);
        let response = self
            .doer
            .execute_with_context(ctx, request)
            .await
            .map_err(|e| transport(&method, &url, e))?;

        let status = response.status();
        if status.is_redirection() {
            if let Some(location) = response.headers().get(LOCATION) {
                let to = String::from_utf8_lossy(location.as_bytes()).into_owned();
                return Err(transport(
                    &method,
                    &url,
                    Error::UnexpectedRedirect {
                        status: status_line(status),
                        from: url.clone(),
                        to,
                    },
                ));
            }
        }
        if status.is_success() {
            return Ok(response);
        }

        let err = match &self.unmarshal_error {
            Some(decode) => decode(&response),
            None => Some(self.default_unmarshal_error(&response)),
        };
        Err(transport(
            &method,
            &url,
            err.unwrap_or_else(|| Error::UnexpectedStatus(status_line(status))),
        ))
    }

    fn default_unmarshal_error(&self, response: &Response<Bytes>) -> Error {
        match decode_json_response::<RemoteError>(response, self.max_error_body_size) {
            Ok(remote) => Error::Remote(remote),
            Err(source) => Error::UnmarshalErrorResponse {
                status: status_line(response.status()),
                source: Box::new(source),
            },
        }
    }

    fn decode_success<T: DeserializeOwned>(&self, response: Response<Bytes>) -> Result<T> {
        decode_json_response(&response, self.max_error_body_size)
    }
}

/// Decode a JSON response body, insisting on an `application/json` content
/// type (charset parameters accepted).
///
/// # Errors
///
/// A [`DecodeResponseError`](crate::DecodeResponseError) carrying the
/// response status and a body snapshot truncated to `max_snapshot` bytes.
pub fn decode_json_response<T: DeserializeOwned>(
    response: &Response<Bytes>,
    max_snapshot: usize,
) -> Result<T> {
    let content_type = media_type(response.headers()).unwrap_or_default();
    if !content_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
        return Err(crate::DecodeResponseError::unexpected_content_type(
            response.status(),
            &content_type,
            snapshot(response.body(), max_snapshot),
        )
        .into());
    }
    serde_json::from_slice(response.body()).map_err(|e| {
        crate::DecodeResponseError::bad_json(
            response.status(),
            &content_type,
            snapshot(response.body(), max_snapshot),
            &e,
        )
        .into()
    })
}

fn snapshot(body: &Bytes, limit: usize) -> Bytes {
    body.slice(..body.len().min(limit))
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn transport(method: &Method, url: &str, source: Error) -> Error {
    Error::Transport {
        method: method.clone(),
        url: url.to_string(),
        source: Box::new(source),
    }
}

fn request_identity(request: &Request<Bytes>) -> (Method, String) {
    (request.method().clone(), request.uri().to_string())
}

fn get_request(url: &str) -> Result<Request<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(Bytes::new())
        .map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

fn route_of<R: Bindable>() -> Result<(Method, String)> {
    let plan = plan_for::<R>()?;
    let no_route = || Error::BadType {
        type_name: type_name::<R>(),
        message: "request type has no route path".to_string(),
    };
    let route = plan.route.as_ref().ok_or_else(no_route)?;
    let template = route.template.as_ref().ok_or_else(no_route)?;
    Ok((route.method.clone(), template.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Field;
    use crate::error::codes;
    use http::header::CONTENT_TYPE;

    struct FnDoer<F>(F);

    impl<F> Doer for FnDoer<F>
    where
        F: Fn(Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync,
    {
        fn execute(&self, request: Request<Bytes>) -> BoxFuture<'static, Result<Response<Bytes>>> {
            let result = (self.0)(request);
            Box::pin(async move { result })
        }
    }

    fn json_response(status: StatusCode, body: &str) -> Result<Response<Bytes>> {
        let mut response = Response::new(Bytes::from(body.to_string()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, CONTENT_TYPE_JSON.parse().unwrap());
        Ok(response)
    }

    #[derive(Default)]
    struct M1Req {
        p: String,
    }

    impl Bindable for M1Req {
        fn route() -> Option<&'static str> {
            Some("GET /m1/:p")
        }

        fn fields() -> Vec<Field<Self>> {
            vec![Field::text("p", ",path", |r: &Self| &r.p, |r, v| r.p = v)]
        }
    }

    #[tokio::test]
    async fn test_call_builds_url_and_decodes() {
        let client = Client::builder(FnDoer(|request: Request<Bytes>| {
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().to_string(), "http://h/m1/hello");
            json_response(StatusCode::OK, r#"{"p":"hello"}"#)
        }))
        .base_url("http://h")
        .build();

        let resp: serde_json::Value = client
            .call(&Context::new(), &M1Req { p: "hello".into() })
            .await
            .unwrap();
        assert_eq!(resp["p"], "hello");
    }

    #[derive(Default)]
    struct NoPathReq;

    impl Bindable for NoPathReq {
        fn route() -> Option<&'static str> {
            Some("GET")
        }

        fn fields() -> Vec<Field<Self>> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_call_requires_route_path() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| json_response(StatusCode::OK, "null")))
            .base_url("http://h")
            .build();
        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &NoPathReq)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("request type has no route path"));
    }

    #[tokio::test]
    async fn test_call_url_drives_method_only_routes() {
        let client = Client::builder(FnDoer(|request: Request<Bytes>| {
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().to_string(), "http://h/m1/hello");
            json_response(StatusCode::OK, r#"{"p":"hello"}"#)
        }))
        .base_url("http://h")
        .build();

        // The record carries only the method; the caller supplies the path.
        #[derive(Default)]
        struct UrlReq {
            p: String,
        }
        impl Bindable for UrlReq {
            fn route() -> Option<&'static str> {
                Some("GET")
            }
            fn fields() -> Vec<Field<Self>> {
                vec![Field::text("p", ",path", |r: &Self| &r.p, |r, v| r.p = v)]
            }
        }

        let resp: serde_json::Value = client
            .call_url(&Context::new(), "/m1/:p", &UrlReq { p: "hello".into() })
            .await
            .unwrap();
        assert_eq!(resp["p"], "hello");
    }

    #[tokio::test]
    async fn test_remote_error_round_trip() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| {
            json_response(
                StatusCode::UNAUTHORIZED,
                r#"{"code":"unauthorized","message":"token expired"}"#,
            )
        }))
        .base_url("http://h")
        .build();

        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET http://h/m1/x: token expired"
        );
        assert_eq!(err.code(), Some(codes::UNAUTHORIZED));
        match err {
            Error::Transport { source, .. } => match *source {
                Error::Remote(remote) => {
                    assert_eq!(remote.code, "unauthorized");
                    assert_eq!(remote.message, "token expired");
                }
                other => panic!("unexpected source: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_error_decoder_returning_none_reports_status() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| {
            json_response(StatusCode::INTERNAL_SERVER_ERROR, "{}")
        }))
        .base_url("http://h")
        .unmarshal_error(|_| None)
        .build();

        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET http://h/m1/x: unexpected HTTP response status: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn test_unexpected_redirect() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            response
                .headers_mut()
                .insert(LOCATION, "http://h/m2/foo".parse().unwrap());
            Ok(response)
        }))
        .base_url("http://h")
        .build();

        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET http://h/m1/x: unexpected redirect (status 307 Temporary Redirect) \
             from \"http://h/m1/x\" to \"http://h/m2/foo\""
        );
    }

    #[tokio::test]
    async fn test_bad_content_in_success_response() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| {
            let mut response = Response::new(Bytes::from_static(b"bad response"));
            *response.status_mut() = StatusCode::OK;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
            Ok(response)
        }))
        .base_url("http://h")
        .build();

        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET http://h/m1/x: unexpected content type text/plain; \
             want application/json; content: \"bad response\""
        );
        match err {
            Error::Transport { source, .. } => match *source {
                Error::DecodeResponse(decode) => {
                    assert_eq!(decode.status, StatusCode::OK);
                    assert_eq!(&decode.body[..], b"bad response");
                }
                other => panic!("unexpected source: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bad_content_in_error_response() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| {
            let mut response = Response::new(Bytes::from_static(b"bad error value"));
            *response.status_mut() = StatusCode::IM_A_TEAPOT;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
            Ok(response)
        }))
        .base_url("http://h")
        .build();

        let err = client
            .call::<_, serde_json::Value>(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET http://h/m1/x: cannot unmarshal error response (status 418 I'm a teapot): \
             unexpected content type text/plain; want application/json; content: \"bad error value\""
        );
    }

    #[tokio::test]
    async fn test_context_aware_doer_is_preferred() {
        struct ContextDoer;

        impl Doer for ContextDoer {
            fn execute(
                &self,
                _request: Request<Bytes>,
            ) -> BoxFuture<'static, Result<Response<Bytes>>> {
                panic!("execute called when execute_with_context expected");
            }

            fn execute_with_context(
                &self,
                ctx: &Context,
                _request: Request<Bytes>,
            ) -> BoxFuture<'static, Result<Response<Bytes>>> {
                assert!(!ctx.is_cancelled());
                Box::pin(async { json_response(StatusCode::OK, r#"{"ok":true}"#) })
            }
        }

        let client = Client::builder(ContextDoer).base_url("http://h").build();
        let resp: serde_json::Value = client
            .call(&Context::new(), &M1Req { p: "x".into() })
            .await
            .unwrap();
        assert_eq!(resp["ok"], true);
    }

    #[tokio::test]
    async fn test_do_request_resolves_relative_url() {
        let client = Client::builder(FnDoer(|request: Request<Bytes>| {
            assert_eq!(request.uri().to_string(), "http://h/m1/foo");
            json_response(StatusCode::OK, r#"{"p":"foo"}"#)
        }))
        .base_url("http://h")
        .build();

        let request = get_request("/m1/foo").unwrap();
        let resp: serde_json::Value = client.do_request(&Context::new(), request).await.unwrap();
        assert_eq!(resp["p"], "foo");
    }

    #[tokio::test]
    async fn test_do_request_with_bad_base_url() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| json_response(StatusCode::OK, "{}")))
            .base_url(":::")
            .build();
        let request = get_request("/m1/hello").unwrap();
        let err = client
            .do_request::<serde_json::Value>(&Context::new(), request)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot parse \":::\""), "{err}");
    }

    #[tokio::test]
    async fn test_get() {
        let client = Client::builder(FnDoer(|request: Request<Bytes>| {
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().to_string(), "http://h/m1/foo");
            json_response(StatusCode::OK, r#"{"p":"foo"}"#)
        }))
        .base_url("http://h")
        .build();
        let resp: serde_json::Value = client.get(&Context::new(), "/m1/foo").await.unwrap();
        assert_eq!(resp["p"], "foo");
    }

    #[tokio::test]
    async fn test_get_raw_transfers_ownership() {
        let client = Client::builder(FnDoer(|_: Request<Bytes>| json_response(StatusCode::OK, r#"{"p":"foo"}"#)))
            .base_url("http://h")
            .build();
        let response = client.get_raw(&Context::new(), "/m1/foo").await.unwrap();
        assert_eq!(&response.body()[..], br#"{"p":"foo"}"#);
    }

    #[test]
    fn test_decode_json_response_content_type_with_charset() {
        let mut response = Response::new(Bytes::from_static(br#""ok""#));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        let value: String = decode_json_response(&response, 1024).unwrap();
        assert_eq!(value, "ok");
    }

    #[test]
    fn test_decode_json_response_truncates_snapshot() {
        let mut response = Response::new(Bytes::from_static(b"123456789 123456789"));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, "foo/bar".parse().unwrap());
        let err = decode_json_response::<String>(&response, 11).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected content type foo/bar; want application/json; content: \"123456789 1\""
        );
    }

    #[test]
    fn test_decode_json_response_decode_error_keeps_snapshot() {
        let mut response = Response::new(Bytes::from_static(br#"{"one": "two"}"#));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, CONTENT_TYPE_JSON.parse().unwrap());
        let err = decode_json_response::<u32>(&response, 1024).unwrap_err();
        match err {
            Error::DecodeResponse(decode) => {
                assert_eq!(decode.status, StatusCode::OK);
                assert_eq!(&decode.body[..], br#"{"one": "two"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_json_response_missing_content_type() {
        let response = Response::new(Bytes::from_static(b"x"));
        let err = decode_json_response::<String>(&response, 1024).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("unexpected content type none; want application/json"),
            "{err}"
        );
    }
}

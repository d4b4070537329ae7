//! Handler synthesis - adapting user functions to router-invokable handlers.
//!
//! A [`Handler`] bundles the route (method and path template, taken from
//! the request record's route tag) with an `invoke` closure the router
//! calls per request. Invocation decodes the request record, runs the user
//! function, and renders its outcome:
//!
//! - [`Server::handle`] - the function owns the response entirely,
//! - [`Server::handle_result`] - a returned error goes through the error
//!   mapper, unless the response is already committed (then it is
//!   suppressed and logged at debug level),
//! - [`Server::handle_json`] - the returned value is JSON-encoded with
//!   status 200; direct writes are refused while the function runs.
//!
//! [`Server::handle_errors`] and [`Server::handle_json_value`] are the
//! route-less conveniences taking only [`Params`].
//!
//! Static violations - an invalid field tag, a bad route tag, a template
//! variable no field binds, an encode-only field - panic at registration
//! time with a `bad handler function` message; they are programmer errors,
//! not request errors.

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::bind::Bindable;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::path::PathVar;
use crate::plan::plan_for;
use crate::unmarshal::{unmarshal, IncomingRequest};
use crate::BoxFuture;

use super::{Params, ResponseSink, Server};

pub(crate) type InvokeFn = Arc<
    dyn Fn(ResponseSink, Arc<IncomingRequest>, Vec<PathVar>) -> BoxFuture<'static, ()>
        + Send
        + Sync,
>;

/// A synthesized route handler.
pub struct Handler {
    /// Route method, empty for route-less handlers.
    pub method: String,
    /// Route path template, empty when the record declares none.
    pub path: String,
    pub(crate) invoke: InvokeFn,
}

impl Handler {
    /// Serve one request. The router supplies the resolved path variables.
    pub async fn handle(
        &self,
        response: ResponseSink,
        request: Arc<IncomingRequest>,
        path_vars: Vec<PathVar>,
    ) {
        (self.invoke)(response, request, path_vars).await
    }
}

/// What a user function produced, normalized across the accepted shapes.
pub(crate) enum Outcome {
    /// No-return shape: the function owned the response.
    Unit,
    /// Error-return shape.
    Fallible(Result<()>),
    /// JSON shape: the encoded success body, or the error.
    Json(Result<Vec<u8>>),
}

/// Render an outcome into the sink.
pub(crate) fn finish(server: &Server, ctx: &Context, sink: &ResponseSink, outcome: Outcome) {
    match outcome {
        Outcome::Unit | Outcome::Fallible(Ok(())) => {}
        Outcome::Fallible(Err(err)) => {
            if sink.committed() {
                tracing::debug!(error = %err, "handler error suppressed: response already committed");
            } else {
                server.write_error(ctx, sink, &err);
            }
        }
        Outcome::Json(result) => {
            sink.set_json_mode(false);
            match result {
                Ok(bytes) => sink.write_json_bytes(StatusCode::OK, bytes),
                Err(err) => {
                    if sink.committed() {
                        tracing::debug!(error = %err, "handler error suppressed: response already committed");
                    } else {
                        server.write_error(ctx, sink, &err);
                    }
                }
            }
        }
    }
}

/// Resolve and validate the record's route at registration time.
///
/// # Panics
///
/// Panics on any plan error or encode-only field; these are static
/// programmer errors.
pub(crate) fn route_for<R: Bindable>() -> (String, String) {
    let plan = match plan_for::<R>() {
        Ok(plan) => plan,
        Err(err) => panic!("bad handler function: {err}"),
    };
    if let Err(err) = plan.require_decodable() {
        panic!("bad handler function: {err}");
    }
    match &plan.route {
        None => (String::new(), String::new()),
        Some(route) => (
            route.method.to_string(),
            route
                .template
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
        ),
    }
}

/// Classify an unmarshal failure the way the error mapper expects: form
/// parse failures surface bare, everything else is wrapped as a parameter
/// unmarshal error.
pub(crate) fn classify_unmarshal(err: Error) -> Error {
    match err {
        Error::BadForm(_) => err,
        other => Error::Unmarshal(Box::new(other)),
    }
}

impl Server {
    fn synthesize<R, C>(&self, json_mode: bool, call: C) -> Handler
    where
        R: Bindable,
        C: Fn(Params, R) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
    {
        let (method, path) = route_for::<R>();
        let server = self.clone();
        let call = Arc::new(call);
        let pattern = path.clone();
        let invoke: InvokeFn = Arc::new(move |sink, request, path_vars| {
            let server = server.clone();
            let call = call.clone();
            let pattern = pattern.clone();
            Box::pin(async move {
                let ctx = Context::new();
                match unmarshal::<R>(&request, &path_vars) {
                    Err(err) => {
                        server.write_error(&ctx, &sink, &classify_unmarshal(err));
                    }
                    Ok(record) => {
                        let params = Params {
                            response: sink.clone(),
                            request,
                            path_vars,
                            path_pattern: pattern,
                            context: ctx.clone(),
                        };
                        if json_mode {
                            sink.set_json_mode(true);
                        }
                        let outcome = call(params, record).await;
                        finish(&server, &ctx, &sink, outcome);
                    }
                }
                ctx.cancel();
            })
        });
        Handler {
            method,
            path,
            invoke,
        }
    }

    /// Adapt a function that owns its response: `Fn(Params, R)`.
    pub fn handle<R, F, Fut>(&self, f: F) -> Handler
    where
        R: Bindable,
        F: Fn(Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.synthesize(false, move |params, record| {
            let fut = f(params, record);
            Box::pin(async move {
                fut.await;
                Outcome::Unit
            }) as BoxFuture<'static, Outcome>
        })
    }

    /// Adapt `Fn(Params, R) -> Result<()>`; errors go to the error mapper.
    pub fn handle_result<R, F, Fut>(&self, f: F) -> Handler
    where
        R: Bindable,
        F: Fn(Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.synthesize(false, move |params, record| {
            let fut = f(params, record);
            Box::pin(async move { Outcome::Fallible(fut.await) }) as BoxFuture<'static, Outcome>
        })
    }

    /// Adapt `Fn(Params, R) -> Result<V>`; `V` is JSON-encoded on success.
    pub fn handle_json<R, V, F, Fut>(&self, f: F) -> Handler
    where
        R: Bindable,
        V: Serialize,
        F: Fn(Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.synthesize(true, move |params, record| {
            let fut = f(params, record);
            Box::pin(async move {
                match fut.await {
                    Ok(value) => Outcome::Json(
                        serde_json::to_vec(&value).map_err(|e| Error::msg(e.to_string())),
                    ),
                    Err(err) => Outcome::Json(Err(err)),
                }
            }) as BoxFuture<'static, Outcome>
        })
    }

    /// Route-less convenience: `Fn(Params) -> Result<()>`. No record is
    /// decoded and the request form is not touched.
    pub fn handle_errors<F, Fut>(&self, f: F) -> Handler
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.paramwise(false, move |params| {
            let fut = f(params);
            Box::pin(async move { Outcome::Fallible(fut.await) }) as BoxFuture<'static, Outcome>
        })
    }

    /// Route-less convenience: `Fn(Params) -> Result<V>` with `V`
    /// JSON-encoded on success.
    pub fn handle_json_value<F, V, Fut>(&self, f: F) -> Handler
    where
        V: Serialize,
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.paramwise(true, move |params| {
            let fut = f(params);
            Box::pin(async move {
                match fut.await {
                    Ok(value) => Outcome::Json(
                        serde_json::to_vec(&value).map_err(|e| Error::msg(e.to_string())),
                    ),
                    Err(err) => Outcome::Json(Err(err)),
                }
            }) as BoxFuture<'static, Outcome>
        })
    }

    fn paramwise<C>(&self, json_mode: bool, call: C) -> Handler
    where
        C: Fn(Params) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
    {
        let server = self.clone();
        let call = Arc::new(call);
        let invoke: InvokeFn = Arc::new(move |sink, request, path_vars| {
            let server = server.clone();
            let call = call.clone();
            Box::pin(async move {
                let ctx = Context::new();
                let params = Params {
                    response: sink.clone(),
                    request,
                    path_vars,
                    path_pattern: String::new(),
                    context: ctx.clone(),
                };
                if json_mode {
                    sink.set_json_mode(true);
                }
                let outcome = call(params).await;
                finish(&server, &ctx, &sink, outcome);
                ctx.cancel();
            })
        });
        Handler {
            method: String::new(),
            path: String::new(),
            invoke,
        }
    }
}

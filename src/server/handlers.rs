//! Handlers derived from a receiver value.
//!
//! A receiver type implements [`HandlerSet`] to name its handler methods;
//! [`Server::handlers`] then emits one [`Handler`] per method. Each request
//! decodes its record, calls the root function to obtain a fresh receiver
//! (and a possibly derived cancellation context), dispatches to the method,
//! and finally invokes the receiver's close hook.
//!
//! The root function sees the request's [`Params`] and - through
//! [`Server::handlers_with_arg`] - the already-decoded request record as
//! `&dyn Any`, so it can inspect or authorize the request before the
//! receiver is built.

use std::any::{type_name, Any};
use std::sync::Arc;

use serde::Serialize;
use std::future::Future;

use crate::bind::Bindable;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::path::PathVar;
use crate::plan::plan_for;
use crate::unmarshal::{unmarshal, IncomingRequest};
use crate::BoxFuture;

use super::handle::{classify_unmarshal, finish, InvokeFn, Outcome};
use super::{Handler, Params, Server};

/// A receiver whose methods become route handlers.
pub trait HandlerSet: Send + Sync + Sized + 'static {
    /// Register the receiver's handler methods.
    fn methods(methods: &mut Methods<Self>);

    /// Invoked after each dispatched request. An error is rendered through
    /// the error mapper unless the response is already committed.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

type DecodeFn = Arc<dyn Fn(&IncomingRequest, &[PathVar]) -> Result<Box<dyn Any + Send>> + Send + Sync>;
type CallFn<T> =
    Arc<dyn Fn(Arc<T>, Params, Box<dyn Any + Send>) -> BoxFuture<'static, Outcome> + Send + Sync>;
type RootFn<T> = Arc<dyn Fn(&Params, &dyn Any) -> Result<(T, Context)> + Send + Sync>;

struct MethodEntry<T> {
    method: String,
    path: String,
    json_mode: bool,
    decode: DecodeFn,
    call: CallFn<T>,
}

/// Registration surface passed to [`HandlerSet::methods`].
///
/// The three registration shapes mirror the free-function handler shapes;
/// each takes the method name (used in registration-time diagnostics) and
/// a `Fn(Arc<Receiver>, Params, Request)` closure.
pub struct Methods<T> {
    entries: Vec<MethodEntry<T>>,
}

impl<T: HandlerSet> Methods<T> {
    /// Register a method that owns its response.
    pub fn handle<R, F, Fut>(&mut self, name: &'static str, f: F)
    where
        R: Bindable,
        F: Fn(Arc<T>, Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let f = Arc::new(f);
        self.push::<R>(name, false, move |receiver, params, record| {
            let fut = f(receiver, params, record);
            Box::pin(async move {
                fut.await;
                Outcome::Unit
            })
        });
    }

    /// Register a method returning `Result<()>`.
    pub fn handle_result<R, F, Fut>(&mut self, name: &'static str, f: F)
    where
        R: Bindable,
        F: Fn(Arc<T>, Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.push::<R>(name, false, move |receiver, params, record| {
            let fut = f(receiver, params, record);
            Box::pin(async move { Outcome::Fallible(fut.await) })
        });
    }

    /// Register a method returning `Result<V>` with `V` JSON-encoded.
    pub fn handle_json<R, V, F, Fut>(&mut self, name: &'static str, f: F)
    where
        R: Bindable,
        V: Serialize,
        F: Fn(Arc<T>, Params, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.push::<R>(name, true, move |receiver, params, record| {
            let fut = f(receiver, params, record);
            Box::pin(async move {
                match fut.await {
                    Ok(value) => Outcome::Json(
                        serde_json::to_vec(&value).map_err(|e| Error::msg(e.to_string())),
                    ),
                    Err(err) => Outcome::Json(Err(err)),
                }
            })
        });
    }

    fn push<R: Bindable>(
        &mut self,
        name: &'static str,
        json_mode: bool,
        call: impl Fn(Arc<T>, Params, R) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
    ) {
        let plan = match plan_for::<R>() {
            Ok(plan) => plan,
            Err(err) => panic!("bad type for method {name}: {err}"),
        };
        if let Err(err) = plan.require_decodable() {
            panic!("bad type for method {name}: {err}");
        }
        let Some(route) = &plan.route else {
            panic!("method {name} does not specify route method and path");
        };
        let Some(template) = &route.template else {
            panic!("method {name} does not specify route method and path");
        };

        let decode: DecodeFn = Arc::new(|request: &IncomingRequest, path_vars: &[PathVar]| {
            let record: R = unmarshal(request, path_vars)?;
            Ok(Box::new(record) as Box<dyn Any + Send>)
        });
        let call: CallFn<T> = Arc::new(move |receiver, params, record| {
            match record.downcast::<R>() {
                Ok(record) => call(receiver, params, *record),
                Err(_) => Box::pin(async {
                    Outcome::Fallible(Err(Error::msg("request record type mismatch")))
                }),
            }
        });
        self.entries.push(MethodEntry {
            method: route.method.to_string(),
            path: template.as_str().to_string(),
            json_mode,
            decode,
            call,
        });
    }
}

impl Server {
    /// Derive one handler per method registered by `T`.
    ///
    /// The root function runs per request, after the request record is
    /// decoded, and returns the receiver plus the context the method will
    /// observe in its [`Params`].
    ///
    /// # Panics
    ///
    /// Panics when `T` registers no methods, or a method's request record
    /// has an invalid plan or no full route.
    pub fn handlers<T, F>(&self, root: F) -> Vec<Handler>
    where
        T: HandlerSet,
        F: Fn(&Params) -> Result<(T, Context)> + Send + Sync + 'static,
    {
        self.handlers_inner::<T>(Arc::new(move |params: &Params, _: &dyn Any| root(params)))
    }

    /// Like [`Server::handlers`], but the root also receives the decoded
    /// request record as `&dyn Any`.
    pub fn handlers_with_arg<T, F>(&self, root: F) -> Vec<Handler>
    where
        T: HandlerSet,
        F: Fn(&Params, &dyn Any) -> Result<(T, Context)> + Send + Sync + 'static,
    {
        self.handlers_inner::<T>(Arc::new(root))
    }

    fn handlers_inner<T: HandlerSet>(&self, root: RootFn<T>) -> Vec<Handler> {
        let mut methods = Methods {
            entries: Vec::new(),
        };
        T::methods(&mut methods);
        if methods.entries.is_empty() {
            panic!("no handler methods defined on {}", type_name::<T>());
        }

        methods
            .entries
            .into_iter()
            .map(|entry| {
                let MethodEntry {
                    method,
                    path,
                    json_mode,
                    decode,
                    call,
                } = entry;
                let server = self.clone();
                let root = root.clone();
                let pattern = path.clone();
                let invoke: InvokeFn = Arc::new(move |sink, request, path_vars| {
                    let server = server.clone();
                    let root = root.clone();
                    let decode = decode.clone();
                    let call = call.clone();
                    let pattern = pattern.clone();
                    Box::pin(async move {
                        let ctx = Context::new();
                        let record = match decode(&request, &path_vars) {
                            Ok(record) => record,
                            Err(err) => {
                                server.write_error(&ctx, &sink, &classify_unmarshal(err));
                                ctx.cancel();
                                return;
                            }
                        };
                        let params = Params {
                            response: sink.clone(),
                            request,
                            path_vars,
                            path_pattern: pattern,
                            context: ctx.clone(),
                        };
                        let (receiver, derived) = match root(&params, record.as_ref()) {
                            Ok(pair) => pair,
                            Err(err) => {
                                server.write_error(&ctx, &sink, &err);
                                ctx.cancel();
                                return;
                            }
                        };
                        let receiver = Arc::new(receiver);
                        let params = Params {
                            context: derived.clone(),
                            ..params
                        };
                        if json_mode {
                            sink.set_json_mode(true);
                        }
                        let outcome = call(receiver.clone(), params, record).await;
                        finish(&server, &derived, &sink, outcome);
                        if let Err(err) = receiver.close() {
                            finish(&server, &derived, &sink, Outcome::Fallible(Err(err)));
                        }
                        derived.cancel();
                        ctx.cancel();
                    })
                });
                Handler {
                    method,
                    path,
                    invoke,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Field;
    use crate::error::{codes, RemoteError};
    use crate::server::ResponseSink;
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use parking_lot::Mutex;

    fn plain_get(uri: &str) -> Arc<IncomingRequest> {
        Arc::new(IncomingRequest::new(
            Request::builder().uri(uri).body(Bytes::new()).unwrap(),
        ))
    }

    #[derive(Default, Debug, PartialEq)]
    struct MReq {
        p: i32,
    }

    impl Bindable for MReq {
        fn route() -> Option<&'static str> {
            Some("GET /m2/:p")
        }

        fn fields() -> Vec<Field<Self>> {
            vec![Field::text("p", "p,path", |r: &Self| &r.p, |r, v| r.p = v)]
        }
    }

    #[derive(Default, Debug, PartialEq)]
    struct M1Req {
        p: i32,
    }

    impl Bindable for M1Req {
        fn route() -> Option<&'static str> {
            Some("GET /m1/:p")
        }

        fn fields() -> Vec<Field<Self>> {
            vec![Field::text("p", "p,path", |r: &Self| &r.p, |r, v| r.p = v)]
        }
    }

    #[derive(Default)]
    struct TestHandlers {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl HandlerSet for TestHandlers {
        fn methods(methods: &mut Methods<Self>) {
            methods.handle("m1", |h: Arc<Self>, params: Params, req: M1Req| async move {
                assert_eq!(req.p, 99);
                assert_eq!(params.path_pattern, "/m1/:p");
                h.log.lock().push("m1".to_string());
            });
            methods.handle_json("m2", |h: Arc<Self>, _params: Params, req: MReq| async move {
                assert_eq!(req.p, 99);
                h.log.lock().push("m2".to_string());
                Ok(999i32)
            });
            methods.handle_result("m3", |h: Arc<Self>, _params: Params, _req: M3Req| async move {
                h.log.lock().push("m3".to_string());
                Err(Error::msg("m3 error"))
            });
        }

        fn close(&self) -> Result<()> {
            self.log.lock().push("close".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct M3Req {
        p: i32,
    }

    impl Bindable for M3Req {
        fn route() -> Option<&'static str> {
            Some("GET /m3/:p")
        }

        fn fields() -> Vec<Field<Self>> {
            vec![Field::text("p", "p,path", |r: &Self| &r.p, |r, v| r.p = v)]
        }
    }

    fn test_handlers(log: Arc<Mutex<Vec<String>>>) -> Vec<Handler> {
        Server::new().handlers(move |_params| Ok((TestHandlers { log: log.clone() }, Context::new())))
    }

    #[test]
    fn test_handlers_expose_routes() {
        let handlers = test_handlers(Arc::new(Mutex::new(Vec::new())));
        let routes: Vec<(String, String)> = handlers
            .iter()
            .map(|h| (h.method.clone(), h.path.clone()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("GET".to_string(), "/m1/:p".to_string()),
                ("GET".to_string(), "/m2/:p".to_string()),
                ("GET".to_string(), "/m3/:p".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_handlers_dispatch_and_close() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = test_handlers(log.clone());

        let sink = ResponseSink::new();
        handlers[1]
            .handle(sink.clone(), plain_get("/m2/99"), vec![PathVar::new("p", "99")])
            .await;
        let response = sink.to_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"999");
        assert_eq!(*log.lock(), vec!["m2", "close"]);
    }

    #[tokio::test]
    async fn test_handlers_error_method() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = test_handlers(log.clone());

        let sink = ResponseSink::new();
        handlers[2]
            .handle(sink.clone(), plain_get("/m3/99"), vec![PathVar::new("p", "99")])
            .await;
        let response = sink.to_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let remote: RemoteError = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(remote.message, "m3 error");
        assert_eq!(*log.lock(), vec!["m3", "close"]);
    }

    #[tokio::test]
    async fn test_root_error_is_mapped() {
        let handlers: Vec<Handler> = Server::new().handlers(|_params| {
            Err::<(TestHandlers, Context), _>(Error::Remote(RemoteError::new(
                codes::UNAUTHORIZED,
                "something: failure",
            )))
        });
        let sink = ResponseSink::new();
        handlers[0]
            .handle(sink.clone(), plain_get("/m1/99"), vec![PathVar::new("p", "99")])
            .await;
        let response = sink.to_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let remote: RemoteError = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(remote.message, "something: failure");
        assert_eq!(remote.code, "unauthorized");
    }

    #[tokio::test]
    async fn test_root_receives_decoded_record() {
        let seen: Arc<Mutex<Option<MReq>>> = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        let handlers = Server::new().handlers_with_arg(move |_params, record: &dyn Any| {
            if let Some(req) = record.downcast_ref::<MReq>() {
                *seen2.lock() = Some(MReq { p: req.p });
            }
            Ok((
                TestHandlers {
                    log: Arc::new(Mutex::new(Vec::new())),
                },
                Context::new(),
            ))
        });
        let sink = ResponseSink::new();
        handlers[1]
            .handle(sink, plain_get("/m2/99"), vec![PathVar::new("p", "99")])
            .await;
        assert_eq!(*seen.lock(), Some(MReq { p: 99 }));
    }

    #[tokio::test]
    async fn test_root_supplies_derived_context() {
        let derived = Context::new();
        let derived2 = derived.clone();
        let observed = Arc::new(Mutex::new(false));
        let observed2 = observed.clone();

        #[derive(Default)]
        struct CtxHandlers {
            derived: Option<Context>,
            observed: Option<Arc<Mutex<bool>>>,
        }

        impl HandlerSet for CtxHandlers {
            fn methods(methods: &mut Methods<Self>) {
                methods.handle("m1", |h: Arc<Self>, params: Params, _req: M1Req| async move {
                    let derived = h.derived.clone().unwrap();
                    derived.cancel();
                    if let Some(observed) = &h.observed {
                        *observed.lock() = params.context.is_cancelled();
                    }
                });
            }
        }

        let handlers = Server::new().handlers(move |_params| {
            Ok((
                CtxHandlers {
                    derived: Some(derived2.clone()),
                    observed: Some(observed2.clone()),
                },
                derived2.clone(),
            ))
        });
        let sink = ResponseSink::new();
        handlers[0]
            .handle(sink, plain_get("/m1/99"), vec![PathVar::new("p", "99")])
            .await;
        // The method observed the root-supplied context: cancelling the
        // derived handle was visible through params.context.
        assert!(*observed.lock());
    }

    #[derive(Default)]
    struct Empty;

    impl HandlerSet for Empty {
        fn methods(_methods: &mut Methods<Self>) {}
    }

    #[test]
    #[should_panic(expected = "no handler methods defined on")]
    fn test_no_methods_panics() {
        let _ = Server::new().handlers(|_| Ok((Empty, Context::new())));
    }

    #[derive(Default)]
    struct RoutelessReq {
        p: i32,
    }

    impl Bindable for RoutelessReq {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::text("p", ",path", |r: &Self| &r.p, |r, v| r.p = v)]
        }
    }

    #[derive(Default)]
    struct NoRoute;

    impl HandlerSet for NoRoute {
        fn methods(methods: &mut Methods<Self>) {
            methods.handle("m", |_: Arc<Self>, _: Params, _: RoutelessReq| async {});
        }
    }

    #[test]
    #[should_panic(expected = "method m does not specify route method and path")]
    fn test_method_without_route_panics() {
        let _ = Server::new().handlers(|_| Ok((NoRoute, Context::new())));
    }

    #[derive(Default)]
    struct CloseFails {
        fail: bool,
    }

    impl HandlerSet for CloseFails {
        fn methods(methods: &mut Methods<Self>) {
            methods.handle("m1", |_: Arc<Self>, _: Params, _: M1Req| async move {});
        }

        fn close(&self) -> Result<()> {
            if self.fail {
                Err(Error::msg("close failed"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_close_error_is_reported_when_response_uncommitted() {
        let handlers =
            Server::new().handlers(|_| Ok((CloseFails { fail: true }, Context::new())));
        let sink = ResponseSink::new();
        handlers[0]
            .handle(sink.clone(), plain_get("/m1/99"), vec![PathVar::new("p", "99")])
            .await;
        let response = sink.to_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let remote: RemoteError = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(remote.message, "close failed");
    }
}

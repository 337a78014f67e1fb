// Handler callable and value types
//
// Handlers come in three callable shapes: metadata-declared functions that
// take resolved arguments, context functions that take only the request
// context, and raw native callbacks that already match the transport
// signature. Storage is type-erased (`Arc<dyn Fn>`), following the same
// erasure approach used for route handlers elsewhere in the stack.

use crate::context::Context;
use crate::http::{BodyStream, NativeRequest, NativeResponse};
use crate::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future alias used across the pipeline.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A handler that receives its resolved arguments and produces a value.
///
/// This is the shape endpoints, middlewares and error middlewares compile
/// down to; argument resolution happens before the call.
pub type ParamsCallback = Arc<dyn Fn(ResolvedArgs) -> BoxFuture<Result<HandlerValue, Error>> + Send + Sync>;

/// A handler invoked with only the request context, no argument resolution.
pub type CtxCallback = Arc<dyn Fn(Context) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// The native continuation: advances the chain, optionally carrying an error.
pub type NextFunction = Arc<dyn Fn(Option<Arc<Error>>) + Send + Sync>;

/// One inbound invocation from the transport.
///
/// `error` is populated only for error-first (4-arg) native signatures.
#[derive(Clone)]
pub struct NativeCall {
    pub request: Arc<NativeRequest>,
    pub response: Arc<NativeResponse>,
    pub next: NextFunction,
    pub error: Option<Arc<Error>>,
}

/// A callback matching the transport's native handler signature.
pub type NativeCallback = Arc<dyn Fn(NativeCall) -> BoxFuture<()> + Send + Sync>;

/// Express/Koa-style middleware returned *by* a handler: invoked against the
/// native request/response, completion is awaited before the chain advances.
pub type NativeMiddleware =
    Arc<dyn Fn(Arc<NativeRequest>, Arc<NativeResponse>) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// Response-like return shape: a handler may return status/headers alongside
/// the body instead of the bare body.
#[derive(Debug, Clone, Default)]
pub struct ResponsePayload {
    pub data: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
    pub status: Option<u16>,
    pub status_text: Option<String>,
}

impl ResponsePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// A successful handler return value, before outcome classification.
pub enum HandlerValue {
    /// Nothing returned; the working data on the context is left untouched.
    None,
    /// A plain value used as the response body.
    Value(Value),
    /// A response-like object carrying body plus status/headers.
    Response(ResponsePayload),
    /// A byte stream; flush pipes it instead of serializing.
    Stream(BodyStream),
    /// Callback-style middleware to run against the native request/response.
    Middleware(NativeMiddleware),
}

impl HandlerValue {
    pub fn json(value: impl Into<Value>) -> Self {
        HandlerValue::Value(value.into())
    }
}

impl std::fmt::Debug for HandlerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerValue::None => write!(f, "HandlerValue::None"),
            HandlerValue::Value(v) => write!(f, "HandlerValue::Value({v})"),
            HandlerValue::Response(r) => write!(f, "HandlerValue::Response({r:?})"),
            HandlerValue::Stream(_) => write!(f, "HandlerValue::Stream(..)"),
            HandlerValue::Middleware(_) => write!(f, "HandlerValue::Middleware(..)"),
        }
    }
}

/// Arguments resolved from the request context for one invocation.
///
/// The pending error and the context itself are carried in dedicated slots
/// so the positional values stay purely serializable.
#[derive(Default)]
pub struct ResolvedArgs {
    pub values: Vec<Value>,
    pub error: Option<Arc<Error>>,
    pub context: Option<Context>,
}

impl ResolvedArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            error: None,
            context: None,
        }
    }
}

impl std::fmt::Debug for ResolvedArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedArgs")
            .field("values", &self.values)
            .field("error", &self.error)
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// Wrap an async closure into a [`ParamsCallback`].
pub fn params_callback<F, Fut>(f: F) -> ParamsCallback
where
    F: Fn(ResolvedArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerValue, Error>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Wrap an async closure into a [`CtxCallback`].
pub fn ctx_callback<F, Fut>(f: F) -> CtxCallback
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wrap an async closure into a [`NativeCallback`].
pub fn native_callback<F, Fut>(f: F) -> NativeCallback
where
    F: Fn(NativeCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

/// Wrap an async closure into a [`NativeMiddleware`].
pub fn native_middleware<F, Fut>(f: F) -> NativeMiddleware
where
    F: Fn(Arc<NativeRequest>, Arc<NativeResponse>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |req, res| Box::pin(f(req, res)))
}

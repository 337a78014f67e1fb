// Handler compilation
//
// Turns immutable handler metadata into a reusable context handler: a
// stateless async closure invoked once per request. Compilation happens once
// per route; the produced closure is shared across every concurrent request
// that hits the route.

use crate::context::Context;
use crate::dispatcher::set_response_headers;
use crate::handler::BoxFuture;
use crate::metadata::{HandlerCallable, HandlerMetadata};
use crate::params::{DefaultParamsResolver, ParamsResolver};
use crate::resolver::{resolve, ResolvedOutcome};
use crate::Error;
use std::sync::Arc;
use tracing::{error, trace};

/// A compiled handler: the per-request entry point the adapter invokes.
///
/// `Ok(())` means the chain may continue (possibly with a pending error on
/// the context); `Err` carries an error thrown by this invocation, already
/// stored on the context.
pub type ContextHandler =
    Arc<dyn Fn(Context) -> BoxFuture<Result<(), Arc<Error>>> + Send + Sync>;

/// Compiles handler metadata into context handlers.
pub struct HandlerCompiler {
    params_resolver: Arc<dyn ParamsResolver>,
}

impl HandlerCompiler {
    pub fn new() -> Self {
        Self {
            params_resolver: Arc::new(DefaultParamsResolver::new()),
        }
    }

    pub fn with_resolver(params_resolver: Arc<dyn ParamsResolver>) -> Self {
        Self { params_resolver }
    }

    /// Compile `metadata` into a [`ContextHandler`].
    ///
    /// Raw native handlers never compile; the adapter passes their callable
    /// through to the transport unchanged.
    pub fn compile(&self, metadata: Arc<HandlerMetadata>) -> Result<ContextHandler, Error> {
        if metadata.is_raw_middleware() {
            return Err(Error::Internal(format!(
                "raw native handler '{metadata}' cannot be compiled"
            )));
        }

        let resolver = self.params_resolver.clone();
        Ok(Arc::new(move |ctx: Context| {
            let metadata = metadata.clone();
            let resolver = resolver.clone();
            Box::pin(async move { on_request(&metadata, resolver.as_ref(), ctx).await })
        }))
    }
}

impl Default for HandlerCompiler {
    fn default() -> Self {
        Self::new()
    }
}

async fn on_request(
    metadata: &Arc<HandlerMetadata>,
    resolver: &dyn ParamsResolver,
    ctx: Context,
) -> Result<(), Arc<Error>> {
    ctx.set_handler(metadata.clone());

    if ctx.request().is_aborted() {
        trace!(
            request_id = %ctx.id(),
            handler = %metadata,
            "request aborted, handler skipped"
        );
        return Ok(());
    }

    if ctx.is_done() {
        error!(
            request_id = %ctx.id(),
            handler = %metadata,
            "headers already sent, handler will not run"
        );
        return Ok(());
    }

    // Error middleware runs only on the error path; everything else is
    // skipped while an error is pending.
    let pending = ctx.error().is_some();
    if pending != metadata.has_error_param() {
        trace!(
            request_id = %ctx.id(),
            handler = %metadata,
            pending_error = pending,
            "handler skipped"
        );
        return Ok(());
    }

    // Context functions (and custom handlers built on them) bypass argument
    // resolution entirely and never implicitly flush.
    let callable = match metadata.callable() {
        HandlerCallable::Ctx(cb) => {
            return match cb(ctx.clone()).await {
                Ok(()) => Ok(()),
                Err(err) => Err(store(&ctx, err)),
            };
        }
        HandlerCallable::Params(cb) => cb.clone(),
        HandlerCallable::Native(_) => {
            return Err(store(
                &ctx,
                Error::Internal(format!(
                    "raw native handler '{metadata}' cannot run as a context handler"
                )),
            ))
        }
    };

    let args = match resolver.resolve(metadata, &ctx).await {
        Ok(args) => args,
        Err(err) => return Err(store(&ctx, err)),
    };

    let value = match callable(args).await {
        Ok(value) => value,
        Err(err) => return Err(store(&ctx, err)),
    };

    apply_outcome(metadata, &ctx, resolve(value)).await
}

/// Apply a classified outcome to the request context, in order: status,
/// headers, data, then the success effects (clear the pending error,
/// finalize endpoint headers, run returned middleware, pipe streams).
async fn apply_outcome(
    metadata: &Arc<HandlerMetadata>,
    ctx: &Context,
    outcome: ResolvedOutcome,
) -> Result<(), Arc<Error>> {
    let response = ctx.response().clone();

    if let Some(status) = outcome.status {
        response.status(status);
    }
    if let Some(headers) = &outcome.headers {
        response.merge_headers(headers);
    }
    if let Some(data) = outcome.data {
        ctx.set_data(data);
    }

    if ctx.is_done() {
        return Ok(());
    }

    ctx.clear_error();

    if metadata.is_endpoint() {
        set_response_headers(ctx);
    }

    if let Some(middleware) = outcome.middleware {
        let request = ctx.request().clone();
        if let Err(err) = middleware(request, response.clone()).await {
            return Err(store(ctx, err));
        }
    }

    if let Some(stream) = outcome.stream {
        ctx.mark_stream_data();
        if let Err(err) = response.send_stream(stream).await {
            return Err(store(ctx, Error::Io(err)));
        }
    }

    Ok(())
}

fn store(ctx: &Context, err: Error) -> Arc<Error> {
    let err = Arc::new(err);
    ctx.set_error(err.clone());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{native_callback, params_callback, HandlerValue, ResolvedArgs};
    use crate::http::{native_pair, NativeRequest};
    use crate::metadata::{HandlerType, ParamType};
    use serde_json::json;

    fn new_context(request: NativeRequest) -> Context {
        let (request, response) = native_pair(request);
        Context::new(request, response)
    }

    fn endpoint(value: serde_json::Value) -> Arc<HandlerMetadata> {
        HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(move |_args: ResolvedArgs| {
                let value = value.clone();
                async move { Ok(HandlerValue::Value(value)) }
            }))
            .build()
    }

    #[tokio::test]
    async fn test_compiled_endpoint_sets_data() {
        let handler = HandlerCompiler::new().compile(endpoint(json!("hello"))).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.data_value(), Some(json!("hello")));
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_raw_metadata_does_not_compile() {
        let metadata = HandlerMetadata::builder("raw")
            .native_callable(native_callback(|_call| async {}), 3)
            .build();

        assert!(HandlerCompiler::new().compile(metadata).is_err());
    }

    #[tokio::test]
    async fn test_pending_error_skips_plain_handler() {
        let handler = HandlerCompiler::new().compile(endpoint(json!("x"))).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));
        ctx.set_error(Arc::new(Error::Forbidden("test".into())));

        handler(ctx.clone()).await.unwrap();

        // Skipped: no data, error still pending.
        assert_eq!(ctx.data_value(), None);
        assert_eq!(ctx.error().unwrap().status_code(), 403);
    }

    #[tokio::test]
    async fn test_error_middleware_skipped_without_pending_error() {
        let metadata = HandlerMetadata::builder("Test.catch")
            .kind(HandlerType::Middleware)
            .params_callable(params_callback(|_args| async {
                Ok(HandlerValue::json("handled"))
            }))
            .param(ParamType::Err)
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.data_value(), None);
    }

    #[tokio::test]
    async fn test_error_middleware_runs_and_clears_error() {
        let metadata = HandlerMetadata::builder("Test.catch")
            .kind(HandlerType::Middleware)
            .params_callable(params_callback(|args: ResolvedArgs| async move {
                assert!(args.error.is_some());
                Ok(HandlerValue::json("recovered"))
            }))
            .param(ParamType::Err)
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));
        ctx.set_error(Arc::new(Error::Forbidden("test".into())));

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.data_value(), Some(json!("recovered")));
        assert!(ctx.error().is_none());
    }

    #[tokio::test]
    async fn test_thrown_error_is_stored_and_returned() {
        let metadata = HandlerMetadata::builder("Test.fail")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|_args| async {
                Err::<HandlerValue, _>(Error::Forbidden("test".into()))
            }))
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        let err = handler(ctx.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(ctx.error().unwrap().status_code(), 403);
    }

    #[tokio::test]
    async fn test_aborted_request_does_nothing() {
        let handler = HandlerCompiler::new().compile(endpoint(json!("x"))).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));
        ctx.request().abort();

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.data_value(), None);
    }

    #[tokio::test]
    async fn test_done_response_blocks_invocation() {
        let handler = HandlerCompiler::new().compile(endpoint(json!("late"))).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));
        ctx.response().body(b"sent".to_vec());

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.data_value(), None);
        assert_eq!(ctx.response().body_bytes(), b"sent".to_vec());
    }

    #[tokio::test]
    async fn test_response_like_return_applies_status_and_headers() {
        let handler = HandlerCompiler::new()
            .compile(endpoint(json!({
                "data": "x",
                "status": 301,
                "headers": {"h": "v"}
            })))
            .unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        handler(ctx.clone()).await.unwrap();
        assert_eq!(ctx.response().status_code(), 301);
        assert_eq!(
            ctx.response().headers().get("h"),
            Some(&"v".to_string())
        );
        assert_eq!(ctx.data_value(), Some(json!("x")));
    }

    #[tokio::test]
    async fn test_returned_middleware_runs_inline() {
        use crate::handler::native_middleware;

        let metadata = HandlerMetadata::builder("Test.mw")
            .kind(HandlerType::Middleware)
            .params_callable(params_callback(|_args| async {
                Ok(HandlerValue::Middleware(native_middleware(
                    |_req, res| async move {
                        res.set_header("x-from-middleware", "1");
                        Ok(())
                    },
                )))
            }))
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        handler(ctx.clone()).await.unwrap();
        assert_eq!(
            ctx.response().headers().get("x-from-middleware"),
            Some(&"1".to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_return_flushes_immediately() {
        use bytes::Bytes;
        use tokio_stream::iter;

        let metadata = HandlerMetadata::builder("Test.stream")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|_args| async {
                let stream: crate::http::BodyStream =
                    Box::pin(iter(vec![Ok(Bytes::from_static(b"streamed"))]));
                Ok(HandlerValue::Stream(stream))
            }))
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();
        let ctx = new_context(NativeRequest::new("GET", "/test"));

        handler(ctx.clone()).await.unwrap();
        assert!(ctx.data_is_stream());
        assert!(ctx.response().is_streamed());
        assert_eq!(ctx.response().body_bytes(), b"streamed".to_vec());
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_isolated() {
        let metadata = HandlerMetadata::builder("Test.echo")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|args: ResolvedArgs| async move {
                tokio::task::yield_now().await;
                Ok(HandlerValue::Value(args.values[0].clone()))
            }))
            .param(ParamType::Query("name".into()))
            .build();

        let handler = HandlerCompiler::new().compile(metadata).unwrap();

        let ctx_a = new_context(NativeRequest::new("GET", "/a").with_query("name", "a"));
        let ctx_b = new_context(NativeRequest::new("GET", "/b").with_query("name", "b"));

        let (ra, rb) = tokio::join!(handler(ctx_a.clone()), handler(ctx_b.clone()));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(ctx_a.data_value(), Some(json!("a")));
        assert_eq!(ctx_b.data_value(), Some(json!("b")));
    }
}

// Request dispatch
//
// Owns the response-side of the lifecycle: header finalization, flushing
// the working data through the response filter, the terminal finish step,
// and the router-facing hooks that turn metadata lists into mountable
// native handler chains.

use crate::adapter::{NativeAdapter, NativeHandler, TransportPolicy};
use crate::compiler::{ContextHandler, HandlerCompiler};
use crate::container::{Container, Provider};
use crate::context::{Context, ContextRegistry};
use crate::exceptions::ExceptionSink;
use crate::handler::{ctx_callback, native_callback, CtxCallback, NativeCall, NextFunction};
use crate::http::BodyStream;
use crate::metadata::{HandlerMetadata, HandlerType};
use crate::response_filter::ResponseFilter;
use crate::Error;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

/// Apply the active endpoint's declared response metadata plus the request
/// id header. Safe to call repeatedly; a finished response is left alone.
pub fn set_response_headers(ctx: &Context) {
    if ctx.is_done() {
        return;
    }

    let response = ctx.response();
    response.set_header("x-request-id", ctx.id());

    if let Some(handler) = ctx.handler() {
        if handler.is_endpoint() {
            // Declared route status applies only while the response still
            // carries the default; a handler-set status wins.
            if let Some(status) = handler.response_status() {
                if response.status_code() == 200 {
                    response.status(status);
                }
            }
            response.merge_headers(handler.response_headers());
        }
    }
}

/// Ties compilation, adaptation and flushing together for one transport.
pub struct RequestDispatcher {
    compiler: Arc<HandlerCompiler>,
    adapter: NativeAdapter,
    registry: Arc<ContextRegistry>,
    response_filter: Arc<dyn ResponseFilter>,
    exceptions: Arc<dyn ExceptionSink>,
    policy: Arc<dyn TransportPolicy>,
    container: Container,
}

impl RequestDispatcher {
    pub fn new(
        compiler: Arc<HandlerCompiler>,
        registry: Arc<ContextRegistry>,
        policy: Arc<dyn TransportPolicy>,
        response_filter: Arc<dyn ResponseFilter>,
        exceptions: Arc<dyn ExceptionSink>,
        container: Container,
    ) -> Self {
        let adapter = NativeAdapter::new(compiler.clone(), registry.clone(), policy.clone());
        Self {
            compiler,
            adapter,
            registry,
            response_filter,
            exceptions,
            policy,
            container,
        }
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Serialize the working data and write the response body.
    ///
    /// Idempotent: a finished response or a stream-piped body is left
    /// untouched.
    pub async fn flush(&self, ctx: &Context) -> Result<(), Error> {
        flush_through(&self.response_filter, ctx).await
    }

    /// Pipe a byte stream straight into the response, bypassing the
    /// response filter entirely.
    pub async fn flush_stream(&self, ctx: &Context, stream: BodyStream) -> Result<(), Error> {
        ctx.mark_stream_data();
        ctx.response().send_stream(stream).await.map_err(Error::Io)
    }

    /// See [`set_response_headers`].
    pub fn set_response_headers(&self, ctx: &Context) {
        set_response_headers(ctx);
    }

    /// Delegate the chain continuation to the transport policy.
    pub async fn continue_chain(
        &self,
        ctx: &Context,
        error: Option<Arc<Error>>,
        next: &NextFunction,
    ) {
        self.policy.continue_chain(ctx, error, next).await;
    }

    /// The terminal step appended to every endpoint chain: flush the
    /// response, hand any remaining error to the exception sink, and drop
    /// the context binding.
    pub fn finish_handler(&self) -> NativeHandler {
        let registry = self.registry.clone();
        let exceptions = self.exceptions.clone();
        let response_filter = self.response_filter.clone();

        let callback = native_callback(move |call: NativeCall| {
            let registry = registry.clone();
            let exceptions = exceptions.clone();
            let response_filter = response_filter.clone();
            async move {
                let ctx = registry.get_or_create(&call.request, &call.response);

                if !call.request.is_aborted() {
                    match call.error.or_else(|| ctx.error()) {
                        Some(err) => exceptions.catch(err, &ctx).await,
                        None => {
                            if let Err(err) = flush_through(&response_filter, &ctx).await {
                                exceptions.catch(Arc::new(err), &ctx).await;
                            }
                        }
                    }
                }

                registry.remove(call.request.id());
            }
        });

        NativeHandler {
            name: "finish".to_string(),
            arity: 2,
            terminal: true,
            callback,
        }
    }

    /// Map one handler's metadata into the transport shape.
    pub fn alter_handler(&self, metadata: Arc<HandlerMetadata>) -> Result<NativeHandler, Error> {
        self.adapter.create_native_handler(metadata)
    }

    /// Map an endpoint's handler chain into the transport shape, appending
    /// the terminal finish step.
    pub fn alter_endpoint_handlers(
        &self,
        metadata_list: Vec<Arc<HandlerMetadata>>,
    ) -> Result<Vec<NativeHandler>, Error> {
        let mut handlers = Vec::with_capacity(metadata_list.len() + 1);
        for metadata in metadata_list {
            handlers.push(self.alter_handler(metadata)?);
        }
        handlers.push(self.finish_handler());
        Ok(handlers)
    }

    /// Compile an ad-hoc context handler outside the route table.
    pub fn create_custom_handler(
        &self,
        name: &str,
        callable: CtxCallback,
    ) -> Result<ContextHandler, Error> {
        let metadata = HandlerMetadata::builder(name)
            .kind(HandlerType::Custom)
            .ctx_callable(callable)
            .build();
        self.compiler.compile(metadata)
    }

    /// Compile a custom handler bound to a registered provider instance.
    pub fn create_provider_handler<P, F, Fut>(
        &self,
        name: &str,
        f: F,
    ) -> Result<ContextHandler, Error>
    where
        P: Provider,
        F: Fn(Arc<P>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let provider = self.container.resolve::<P>()?;
        self.create_custom_handler(
            name,
            ctx_callback(move |ctx| f(provider.clone(), ctx)),
        )
    }
}

async fn flush_through(filter: &Arc<dyn ResponseFilter>, ctx: &Context) -> Result<(), Error> {
    if ctx.is_done() || ctx.data_is_stream() {
        trace!(request_id = %ctx.id(), "flush skipped, response settled");
        return Ok(());
    }

    let data = filter.serialize(ctx.data_value(), ctx).await?;
    let data = filter.transform(data, ctx).await?;

    let response = ctx.response();
    let body = match data {
        None => Vec::new(),
        Some(Value::String(s)) => {
            if !response.headers().contains_key("content-type") {
                response.set_header("content-type", "text/plain");
            }
            s.into_bytes()
        }
        Some(other) => {
            if !response.headers().contains_key("content-type") {
                response.set_header("content-type", "application/json");
            }
            serde_json::to_vec(&other).map_err(|e| Error::Serialization(e.to_string()))?
        }
    };

    response.body(body);
    debug!(request_id = %ctx.id(), status = response.status_code(), "response flushed");
    Ok(())
}

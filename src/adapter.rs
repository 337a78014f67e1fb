// Native transport adaptation
//
// Bridges compiled context handlers to the transport's callback signature.
// Raw native handlers pass through untouched; everything else is wrapped in
// a callback that binds the request context, runs the compiled handler, and
// hands the result to the transport policy's continuation.

use crate::compiler::{ContextHandler, HandlerCompiler};
use crate::context::{Context, ContextRegistry};
use crate::exceptions::ExceptionSink;
use crate::handler::{native_callback, NativeCall, NativeCallback, NextFunction};
use crate::metadata::{HandlerCallable, HandlerMetadata};
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// A handler in the transport's shape, ready for a router to mount.
///
/// `arity` is part of the external contract: transports sniff it to decide
/// between the plain and the error-first calling convention. Only the
/// appended finish step carries `terminal`; it runs on the error path even
/// though its arity is below 4.
#[derive(Clone)]
pub struct NativeHandler {
    pub name: String,
    pub arity: usize,
    pub terminal: bool,
    pub callback: NativeCallback,
}

impl std::fmt::Debug for NativeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandler")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("terminal", &self.terminal)
            .finish()
    }
}

/// How a transport wants the chain continued after a handler ran.
#[async_trait]
pub trait TransportPolicy: Send + Sync {
    async fn continue_chain(&self, ctx: &Context, error: Option<Arc<Error>>, next: &NextFunction);
}

/// Express-like continuation: call `next` unless the response is finished or
/// the body went out as a stream; a pending error rides along.
#[derive(Default)]
pub struct ExpressPolicy;

impl ExpressPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportPolicy for ExpressPolicy {
    async fn continue_chain(&self, ctx: &Context, error: Option<Arc<Error>>, next: &NextFunction) {
        if ctx.data_is_stream() || ctx.is_done() {
            trace!(request_id = %ctx.id(), "chain stops, response settled");
            return;
        }
        next(error.or_else(|| ctx.error()));
    }
}

/// Koa-like continuation: errors are raised to the exception sink instead of
/// travelling through `next`, except on a non-final endpoint where the chain
/// still owns the error path; `next` is suppressed after a final handler.
pub struct KoaPolicy {
    exceptions: Arc<dyn ExceptionSink>,
}

impl KoaPolicy {
    pub fn new(exceptions: Arc<dyn ExceptionSink>) -> Self {
        Self { exceptions }
    }
}

#[async_trait]
impl TransportPolicy for KoaPolicy {
    async fn continue_chain(&self, ctx: &Context, error: Option<Arc<Error>>, next: &NextFunction) {
        if ctx.data_is_stream() || ctx.is_done() {
            return;
        }

        if let Some(err) = error.or_else(|| ctx.error()) {
            let chain_owns_error = ctx
                .handler()
                .map(|h| h.is_endpoint() && !h.is_final())
                .unwrap_or(false);
            if chain_owns_error {
                next(Some(err));
            } else {
                self.exceptions.catch(err, ctx).await;
            }
            return;
        }

        if !ctx.handler().map(|h| h.is_final()).unwrap_or(false) {
            next(None);
        }
    }
}

/// Adapts handler metadata into native transport handlers.
pub struct NativeAdapter {
    compiler: Arc<HandlerCompiler>,
    registry: Arc<ContextRegistry>,
    policy: Arc<dyn TransportPolicy>,
}

impl NativeAdapter {
    pub fn new(
        compiler: Arc<HandlerCompiler>,
        registry: Arc<ContextRegistry>,
        policy: Arc<dyn TransportPolicy>,
    ) -> Self {
        Self {
            compiler,
            registry,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Build the native callback for one handler.
    ///
    /// Raw handlers keep their own callable and declared arity; compiled
    /// handlers get the 4-arg shape only when they consume the error.
    pub fn create_native_handler(
        &self,
        metadata: Arc<HandlerMetadata>,
    ) -> Result<NativeHandler, Error> {
        if metadata.is_raw_middleware() {
            let callback = match metadata.callable() {
                HandlerCallable::Native(cb) => cb.clone(),
                _ => {
                    return Err(Error::Internal(format!(
                        "raw handler '{metadata}' carries no native callable"
                    )))
                }
            };
            let arity = if metadata.has_error_param() {
                4
            } else if metadata.has_next_function() {
                3
            } else {
                2
            };
            return Ok(NativeHandler {
                name: metadata.name().to_string(),
                arity,
                terminal: false,
                callback,
            });
        }

        let arity = if metadata.has_error_param() { 4 } else { 3 };
        let handler = self.compiler.compile(metadata.clone())?;
        Ok(NativeHandler {
            name: metadata.name().to_string(),
            arity,
            terminal: false,
            callback: self.wrap(handler),
        })
    }

    /// Wrap an already-compiled context handler into the native shape.
    pub fn wrap(&self, handler: ContextHandler) -> NativeCallback {
        let registry = self.registry.clone();
        let policy = self.policy.clone();
        native_callback(move |call: NativeCall| {
            let handler = handler.clone();
            let registry = registry.clone();
            let policy = policy.clone();
            async move {
                let ctx = registry.get_or_create(&call.request, &call.response);
                if let Some(incoming) = call.error {
                    ctx.set_error(incoming);
                }

                let error = handler(ctx.clone()).await.err();
                policy.continue_chain(&ctx, error, &call.next).await;
            }
        })
    }
}

// Pipeline wiring
//
// Builder that assembles the dispatch core (compiler, adapter, dispatcher,
// container, registry) around pluggable capabilities, plus a sequential
// chain runner with router-equivalent semantics: plain handlers are skipped
// while an error is pending, error-first handlers receive it, and the
// terminal step always runs.

use crate::adapter::{ExpressPolicy, KoaPolicy, NativeHandler, TransportPolicy};
use crate::compiler::HandlerCompiler;
use crate::container::Container;
use crate::context::ContextRegistry;
use crate::dispatcher::RequestDispatcher;
use crate::exceptions::{DefaultExceptionSink, ExceptionSink};
use crate::handler::{NativeCall, NextFunction};
use crate::http::{native_pair, NativeRequest, NativeResponse};
use crate::metadata::HandlerMetadata;
use crate::params::ParamsResolver;
use crate::response_filter::{JsonResponseFilter, ResponseFilter};
use crate::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Assembled dispatch core for one transport.
pub struct Pipeline {
    dispatcher: Arc<RequestDispatcher>,
    registry: Arc<ContextRegistry>,
    container: Container,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Map an endpoint's metadata chain into mountable native handlers,
    /// finish step included.
    pub fn route(
        &self,
        metadata_list: Vec<Arc<HandlerMetadata>>,
    ) -> Result<Vec<NativeHandler>, Error> {
        self.dispatcher.alter_endpoint_handlers(metadata_list)
    }

    /// Drive a handler chain for one request the way a router would.
    ///
    /// Handlers run in order; each must call its continuation for the chain
    /// to advance. A pending error skips everything below arity 4 and is
    /// delivered only to error-first (4-arg) handlers and the terminal step.
    pub async fn run_chain(
        &self,
        handlers: &[NativeHandler],
        request: NativeRequest,
    ) -> (Arc<NativeRequest>, Arc<NativeResponse>) {
        let (request, response) = native_pair(request);
        let mut pending: Option<Arc<Error>> = None;

        for handler in handlers {
            if pending.is_some() && handler.arity < 4 && !handler.terminal {
                trace!(handler = %handler.name, "handler skipped on error path");
                continue;
            }

            let signal: Arc<Mutex<Option<Option<Arc<Error>>>>> = Arc::new(Mutex::new(None));
            let seen = signal.clone();
            let next: NextFunction = Arc::new(move |err| {
                *seen.lock() = Some(err);
            });

            (handler.callback)(NativeCall {
                request: request.clone(),
                response: response.clone(),
                next,
                error: pending.clone(),
            })
            .await;

            match signal.lock().take() {
                Some(err) => pending = err,
                None => break,
            }
        }

        // Mirrors a router's finish event: a settled response releases the
        // context binding even when the chain stopped before the finish step.
        if response.is_done() || request.is_aborted() {
            self.registry.remove(request.id());
        }

        (request, response)
    }
}

/// Builds a [`Pipeline`] with defaults matching an Express-like transport.
pub struct PipelineBuilder {
    params_resolver: Option<Arc<dyn ParamsResolver>>,
    response_filter: Arc<dyn ResponseFilter>,
    exceptions: Arc<dyn ExceptionSink>,
    policy: Option<Arc<dyn TransportPolicy>>,
    container: Container,
    koa: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            params_resolver: None,
            response_filter: Arc::new(JsonResponseFilter::new()),
            exceptions: Arc::new(DefaultExceptionSink::new()),
            policy: None,
            container: Container::new(),
            koa: false,
        }
    }

    pub fn params_resolver(mut self, resolver: Arc<dyn ParamsResolver>) -> Self {
        self.params_resolver = Some(resolver);
        self
    }

    pub fn response_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.response_filter = filter;
        self
    }

    pub fn exception_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.exceptions = sink;
        self
    }

    pub fn transport_policy(mut self, policy: Arc<dyn TransportPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use the Koa-like continuation policy built on the configured sink.
    pub fn koa(mut self) -> Self {
        self.koa = true;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn build(self) -> Pipeline {
        let compiler = Arc::new(match self.params_resolver {
            Some(resolver) => HandlerCompiler::with_resolver(resolver),
            None => HandlerCompiler::new(),
        });

        let policy: Arc<dyn TransportPolicy> = match (self.policy, self.koa) {
            (Some(policy), _) => policy,
            (None, true) => Arc::new(KoaPolicy::new(self.exceptions.clone())),
            (None, false) => Arc::new(ExpressPolicy::new()),
        };

        let registry = Arc::new(ContextRegistry::new());
        let dispatcher = Arc::new(RequestDispatcher::new(
            compiler,
            registry.clone(),
            policy,
            self.response_filter,
            self.exceptions,
            self.container.clone(),
        ));

        Pipeline {
            dispatcher,
            registry,
            container: self.container,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{params_callback, HandlerValue};
    use crate::metadata::HandlerType;

    #[tokio::test]
    async fn test_chain_runs_endpoint_to_finish() {
        let pipeline = Pipeline::builder().build();
        let metadata = HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|_args| async {
                Ok(HandlerValue::json("hello"))
            }))
            .build();

        let handlers = pipeline.route(vec![metadata]).unwrap();
        let (_, response) = pipeline
            .run_chain(&handlers, NativeRequest::new("GET", "/test"))
            .await;

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body_bytes(), b"hello".to_vec());
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_chain_stops_when_next_not_called() {
        use crate::handler::native_callback;

        let pipeline = Pipeline::builder().build();
        let silent = HandlerMetadata::builder("silent")
            .native_callable(native_callback(|_call| async {}), 2)
            .build();
        let endpoint = HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|_args| async {
                Ok(HandlerValue::json("unreached"))
            }))
            .build();

        let handlers = pipeline.route(vec![silent, endpoint]).unwrap();
        let (_, response) = pipeline
            .run_chain(&handlers, NativeRequest::new("GET", "/test"))
            .await;

        assert!(!response.is_done());
    }
}

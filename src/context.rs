// Per-request context
//
// Exactly one live context exists per in-flight request; it is created at
// the adapter boundary, threaded explicitly through every pipeline
// operation, and discarded by the terminal finish step. Nothing in here is
// ever shared between two requests.

use crate::http::{NativeRequest, NativeResponse};
use crate::metadata::HandlerMetadata;
use crate::Error;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The working result carried across the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextData {
    /// No handler has produced data yet.
    None,
    /// Serializable body data.
    Value(Value),
    /// The body was (or is being) piped as a stream; the serializer must
    /// never touch it.
    Stream,
}

struct ContextState {
    error: Option<Arc<Error>>,
    data: ContextData,
    handler: Option<Arc<HandlerMetadata>>,
}

/// Cheaply cloneable handle to one request's state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: String,
    request: Arc<NativeRequest>,
    response: Arc<NativeResponse>,
    state: RwLock<ContextState>,
}

impl Context {
    pub fn new(request: Arc<NativeRequest>, response: Arc<NativeResponse>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: uuid::Uuid::new_v4().to_string(),
                request,
                response,
                state: RwLock::new(ContextState {
                    error: None,
                    data: ContextData::None,
                    handler: None,
                }),
            }),
        }
    }

    /// Request id, surfaced to clients as `x-request-id`.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn request(&self) -> &Arc<NativeRequest> {
        &self.inner.request
    }

    pub fn response(&self) -> &Arc<NativeResponse> {
        &self.inner.response
    }

    /// The pending error, if any.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.inner.state.read().error.clone()
    }

    pub fn set_error(&self, error: Arc<Error>) {
        self.inner.state.write().error = Some(error);
    }

    pub fn clear_error(&self) {
        self.inner.state.write().error = None;
    }

    pub fn data(&self) -> ContextData {
        self.inner.state.read().data.clone()
    }

    /// The working data when it is serializable; `None` for empty or
    /// streamed data.
    pub fn data_value(&self) -> Option<Value> {
        match &self.inner.state.read().data {
            ContextData::Value(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn set_data(&self, data: Value) {
        self.inner.state.write().data = ContextData::Value(data);
    }

    /// Record that the body is handled by a stream pipe.
    pub fn mark_stream_data(&self) {
        self.inner.state.write().data = ContextData::Stream;
    }

    pub fn data_is_stream(&self) -> bool {
        matches!(self.inner.state.read().data, ContextData::Stream)
    }

    /// Metadata of the handler currently running, swapped as the chain
    /// advances; identifies the active handler in diagnostics.
    pub fn handler(&self) -> Option<Arc<HandlerMetadata>> {
        self.inner.state.read().handler.clone()
    }

    pub fn set_handler(&self, metadata: Arc<HandlerMetadata>) {
        self.inner.state.write().handler = Some(metadata);
    }

    /// True once the response has been written or the transport reported the
    /// request aborted; either way the pipeline must not touch the response.
    pub fn is_done(&self) -> bool {
        self.inner.response.is_done() || self.inner.request.is_aborted()
    }
}

/// Binds contexts to inbound native calls.
///
/// The adapter boundary is the only place allowed to look a context up from
/// transport-native state; everything below it takes the context explicitly.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: Mutex<HashMap<u64, Context>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context bound to `request`, creating it on the first call.
    pub fn get_or_create(
        &self,
        request: &Arc<NativeRequest>,
        response: &Arc<NativeResponse>,
    ) -> Context {
        let mut contexts = self.contexts.lock();
        contexts
            .entry(request.id())
            .or_insert_with(|| Context::new(request.clone(), response.clone()))
            .clone()
    }

    pub fn get(&self, request_id: u64) -> Option<Context> {
        self.contexts.lock().get(&request_id).cloned()
    }

    /// Drop the binding once the response is finalized.
    pub fn remove(&self, request_id: u64) -> Option<Context> {
        self.contexts.lock().remove(&request_id)
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

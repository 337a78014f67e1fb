// Native request and response wrappers
//
// These are the transport-facing primitives the dispatch core consumes. A
// concrete adapter (Express-like, Koa-like) owns the real socket; the
// pipeline only sees these handles.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Streaming response body: a sequence of byte chunks piped to the client
/// without going through the serializer.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Inbound request handle.
///
/// Immutable apart from the transport-reported abort flag; shared across the
/// handler chain behind an `Arc`.
#[derive(Debug)]
pub struct NativeRequest {
    id: u64,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    aborted: AtomicBool,
}

impl NativeRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            query_params: HashMap::new(),
            aborted: AtomicBool::new(false),
        }
    }

    /// Unique id for this inbound call, used to bind the request context.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get a request header by name
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Transport-reported abort. Once set, the pipeline does nothing further
    /// for this request: no handler invocation, no continuation, no write.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Default)]
struct ResponseState {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    done: bool,
    streamed: bool,
}

/// Outbound response handle.
///
/// Shared between the pipeline and the transport; all mutation goes through
/// a lock so a compiled handler and the transport callback never race.
#[derive(Debug)]
pub struct NativeResponse {
    state: Mutex<ResponseState>,
}

impl NativeResponse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ResponseState {
                status: 200,
                ..ResponseState::default()
            }),
        }
    }

    /// Set the response status code. Ignored once the response is done.
    pub fn status(&self, code: u16) {
        let mut state = self.state.lock();
        if !state.done {
            state.status = code;
        }
    }

    pub fn status_code(&self) -> u16 {
        self.state.lock().status
    }

    /// Merge headers into the response. Existing entries with the same name
    /// are overwritten, others are kept.
    pub fn merge_headers(&self, headers: &HashMap<String, String>) {
        let mut state = self.state.lock();
        if !state.done {
            for (name, value) in headers {
                state.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Set a single header. Ignored once the response is done.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock();
        if !state.done {
            state.headers.insert(name.into(), value.into());
        }
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.state.lock().headers.clone()
    }

    /// Write the response body and end the response. The first write wins;
    /// later writes are dropped to protect against double-write bugs.
    pub fn body(&self, body: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        if state.done {
            return false;
        }
        state.body = body;
        state.done = true;
        true
    }

    /// Pipe a byte stream into the response and end it. The serializer never
    /// sees streamed bodies.
    ///
    /// # Example
    ///
    /// ```
    /// use gantry_core::http::{BodyStream, NativeResponse};
    /// use bytes::Bytes;
    ///
    /// # tokio_test::block_on(async {
    /// let res = NativeResponse::new();
    /// let stream: BodyStream = Box::pin(tokio_stream::iter(vec![
    ///     Ok(Bytes::from_static(b"chunk")),
    /// ]));
    ///
    /// res.send_stream(stream).await.unwrap();
    /// assert!(res.is_streamed());
    /// # });
    /// ```
    pub async fn send_stream(&self, mut stream: BodyStream) -> Result<(), std::io::Error> {
        let mut piped = Vec::new();
        while let Some(chunk) = stream.next().await {
            piped.extend_from_slice(&chunk?);
        }

        let mut state = self.state.lock();
        if !state.done {
            state.body = piped;
            state.done = true;
            state.streamed = true;
        }
        Ok(())
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        self.state.lock().body.clone()
    }

    /// True once the body has been written or the response otherwise ended.
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// True when the body was produced by piping a stream.
    pub fn is_streamed(&self) -> bool {
        self.state.lock().streamed
    }
}

impl Default for NativeResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a shared request/response pair for one inbound call.
pub fn native_pair(request: NativeRequest) -> (Arc<NativeRequest>, Arc<NativeResponse>) {
    (Arc::new(request), Arc::new(NativeResponse::new()))
}

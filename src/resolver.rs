// Return-value classification
//
// Normalizes whatever a handler returned into a single outcome shape the
// dispatcher can act on. Only successful returns come through here; thrown
// errors bypass the resolver entirely and surface at the compiler boundary.

use crate::handler::{HandlerValue, NativeMiddleware, ResponsePayload};
use crate::http::BodyStream;
use serde_json::Value;
use std::collections::HashMap;

/// Terminal classification of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeState {
    Resolved,
    Rejected,
    Stream,
}

/// What one invocation produced: body data and/or response effects.
///
/// Consumed exactly once by the dispatcher, never persisted.
pub struct ResolvedOutcome {
    pub state: OutcomeState,
    pub data: Option<Value>,
    pub status: Option<u16>,
    pub headers: Option<HashMap<String, String>>,
    pub stream: Option<BodyStream>,
    pub middleware: Option<NativeMiddleware>,
}

impl ResolvedOutcome {
    fn resolved() -> Self {
        Self {
            state: OutcomeState::Resolved,
            data: None,
            status: None,
            headers: None,
            stream: None,
            middleware: None,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.state == OutcomeState::Stream
    }
}

impl std::fmt::Debug for ResolvedOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOutcome")
            .field("state", &self.state)
            .field("data", &self.data)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("stream", &self.stream.is_some())
            .field("middleware", &self.middleware.is_some())
            .finish()
    }
}

/// Classify a successful handler return value.
pub fn resolve(value: HandlerValue) -> ResolvedOutcome {
    match value {
        HandlerValue::None => ResolvedOutcome::resolved(),
        HandlerValue::Middleware(middleware) => {
            // Data is deliberately not resolved; the caller invokes the
            // middleware against the native request/response and awaits it.
            let mut outcome = ResolvedOutcome::resolved();
            outcome.middleware = Some(middleware);
            outcome
        }
        HandlerValue::Stream(stream) => {
            let mut outcome = ResolvedOutcome::resolved();
            outcome.state = OutcomeState::Stream;
            outcome.stream = Some(stream);
            outcome
        }
        HandlerValue::Response(payload) => from_payload(payload),
        HandlerValue::Value(value) => match response_payload_from_value(&value) {
            Some(payload) => from_payload(payload),
            None => {
                let mut outcome = ResolvedOutcome::resolved();
                outcome.data = Some(value);
                outcome
            }
        },
    }
}

fn from_payload(payload: ResponsePayload) -> ResolvedOutcome {
    let mut outcome = ResolvedOutcome::resolved();
    outcome.data = payload.data;
    outcome.status = payload.status;
    outcome.headers = payload.headers;
    outcome
}

/// Detect the dynamic response-like shape: a JSON object whose keys are a
/// subset of {data, headers, status, statusText}, at least one present.
/// Anything else is an ordinary body and passes through untouched.
fn response_payload_from_value(value: &Value) -> Option<ResponsePayload> {
    const RESPONSE_KEYS: [&str; 4] = ["data", "headers", "status", "statusText"];

    let obj = value.as_object()?;
    if obj.is_empty() || !obj.keys().all(|k| RESPONSE_KEYS.contains(&k.as_str())) {
        return None;
    }

    let mut payload = ResponsePayload::new();
    payload.data = obj.get("data").cloned();

    if let Some(status) = obj.get("status") {
        payload.status = Some(u16::try_from(status.as_u64()?).ok()?);
    }

    if let Some(headers) = obj.get("headers") {
        let map = headers.as_object()?;
        let mut out = HashMap::new();
        for (name, value) in map {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.insert(name.clone(), value);
        }
        payload.headers = Some(out);
    }

    if let Some(text) = obj.get("statusText") {
        payload.status_text = Some(text.as_str()?.to_string());
    }

    Some(payload)
}

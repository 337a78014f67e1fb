// Exception sink capability
//
// User-visible failure behavior is owned by the sink: the pipeline
// guarantees every thrown error reaches it at most once per request, and
// that it never double-writes a response.

use crate::Error;
use crate::HttpStatus;
use crate::context::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Terminal error consumer.
#[async_trait]
pub trait ExceptionSink: Send + Sync {
    async fn catch(&self, error: Arc<Error>, ctx: &Context);
}

/// Wire shape of the default sink's error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub name: &'static str,
    pub message: String,
}

/// Writes an RFC 7807-ish JSON error body with the error's status code.
#[derive(Default)]
pub struct DefaultExceptionSink;

impl DefaultExceptionSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExceptionSink for DefaultExceptionSink {
    async fn catch(&self, err: Arc<Error>, ctx: &Context) {
        if ctx.is_done() {
            warn!(
                request_id = %ctx.id(),
                error = %err,
                "error reached the sink after the response was finalized"
            );
            return;
        }

        let status = err.status_code();
        let reason = HttpStatus::from_code(status)
            .map(|s| s.reason())
            .unwrap_or("Internal Server Error");

        error!(
            request_id = %ctx.id(),
            status = status,
            error = %err,
            "request failed"
        );

        let body = ErrorBody {
            status,
            name: reason,
            message: err.to_string(),
        };

        let response = ctx.response();
        response.status(status);
        response.set_header("content-type", "application/json");
        match serde_json::to_vec(&body) {
            Ok(bytes) => {
                response.body(bytes);
            }
            Err(serde_err) => {
                error!(error = %serde_err, "failed to encode error body");
                response.body(Vec::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{native_pair, NativeRequest};

    fn new_context() -> Context {
        let (request, response) = native_pair(NativeRequest::new("GET", "/test"));
        Context::new(request, response)
    }

    #[tokio::test]
    async fn test_sink_writes_error_response() {
        let ctx = new_context();
        let sink = DefaultExceptionSink::new();

        sink.catch(Arc::new(Error::Forbidden("test".into())), &ctx)
            .await;

        let response = ctx.response();
        assert_eq!(response.status_code(), 403);
        assert!(response.is_done());

        let body: serde_json::Value = serde_json::from_slice(&response.body_bytes()).unwrap();
        assert_eq!(body["status"], 403);
        assert_eq!(body["name"], "Forbidden");
        assert_eq!(body["message"], "Forbidden: test");
    }

    #[tokio::test]
    async fn test_sink_never_double_writes() {
        let ctx = new_context();
        ctx.response().status(200);
        ctx.response().body(b"already sent".to_vec());

        let sink = DefaultExceptionSink::new();
        sink.catch(Arc::new(Error::Internal("late".into())), &ctx)
            .await;

        assert_eq!(ctx.response().status_code(), 200);
        assert_eq!(ctx.response().body_bytes(), b"already sent".to_vec());
    }
}

// Argument resolution capability
//
// The pipeline consumes this as a seam: given handler metadata and the
// request context, produce the arguments the target wants. A full framework
// plugs its own resolver in; the default covers the declared parameter
// shapes the core knows about.

use crate::context::Context;
use crate::handler::ResolvedArgs;
use crate::metadata::{HandlerMetadata, ParamType};
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;

/// Resolves a handler's declared arguments from the request context.
#[async_trait]
pub trait ParamsResolver: Send + Sync {
    async fn resolve(
        &self,
        metadata: &HandlerMetadata,
        ctx: &Context,
    ) -> Result<ResolvedArgs, Error>;
}

/// Maps declared `ParamType`s straight off the request.
#[derive(Default)]
pub struct DefaultParamsResolver;

impl DefaultParamsResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ParamsResolver for DefaultParamsResolver {
    async fn resolve(
        &self,
        metadata: &HandlerMetadata,
        ctx: &Context,
    ) -> Result<ResolvedArgs, Error> {
        let mut args = ResolvedArgs::default();
        let request = ctx.request();

        for param in metadata.params() {
            match param {
                ParamType::Err => {
                    args.error = ctx.error();
                    let message = args
                        .error
                        .as_ref()
                        .map(|e| Value::String(e.to_string()))
                        .unwrap_or(Value::Null);
                    args.values.push(message);
                }
                ParamType::Next => {
                    // The continuation is owned by the adapter, never
                    // materialized as an argument value.
                    args.values.push(Value::Null);
                }
                ParamType::Context => {
                    args.context = Some(ctx.clone());
                }
                ParamType::Query(name) => {
                    let value = request
                        .query(name)
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null);
                    args.values.push(value);
                }
                ParamType::Header(name) => {
                    let value = request
                        .header(name)
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null);
                    args.values.push(value);
                }
                ParamType::Path => {
                    args.values.push(Value::String(request.path.clone()));
                }
                ParamType::Method => {
                    args.values.push(Value::String(request.method.clone()));
                }
            }
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{params_callback, HandlerValue};
    use crate::http::{native_pair, NativeRequest};
    use crate::metadata::HandlerType;
    use serde_json::json;
    use std::sync::Arc;

    fn context_for(request: NativeRequest) -> Context {
        let (request, response) = native_pair(request);
        Context::new(request, response)
    }

    fn metadata_with(params: Vec<ParamType>) -> Arc<HandlerMetadata> {
        HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(params_callback(|_args| async { Ok(HandlerValue::None) }))
            .params(params)
            .build()
    }

    #[tokio::test]
    async fn test_query_and_header_resolution() {
        let ctx = context_for(
            NativeRequest::new("GET", "/users")
                .with_query("test", "value")
                .with_header("x-api-key", "secret"),
        );
        let metadata = metadata_with(vec![
            ParamType::Query("test".into()),
            ParamType::Header("x-api-key".into()),
            ParamType::Method,
        ]);

        let args = DefaultParamsResolver::new()
            .resolve(&metadata, &ctx)
            .await
            .unwrap();

        assert_eq!(
            args.values,
            vec![json!("value"), json!("secret"), json!("GET")]
        );
    }

    #[tokio::test]
    async fn test_missing_query_resolves_null() {
        let ctx = context_for(NativeRequest::new("GET", "/users"));
        let metadata = metadata_with(vec![ParamType::Query("absent".into())]);

        let args = DefaultParamsResolver::new()
            .resolve(&metadata, &ctx)
            .await
            .unwrap();

        assert_eq!(args.values, vec![Value::Null]);
    }

    #[tokio::test]
    async fn test_error_param_carries_pending_error() {
        let ctx = context_for(NativeRequest::new("GET", "/users"));
        ctx.set_error(Arc::new(Error::Forbidden("test".into())));

        let metadata = metadata_with(vec![ParamType::Err]);
        let args = DefaultParamsResolver::new()
            .resolve(&metadata, &ctx)
            .await
            .unwrap();

        assert!(args.error.is_some());
        assert_eq!(args.values, vec![json!("Forbidden: test")]);
    }

    #[tokio::test]
    async fn test_context_param_fills_context_slot() {
        let ctx = context_for(NativeRequest::new("GET", "/users"));
        let metadata = metadata_with(vec![ParamType::Context]);

        let args = DefaultParamsResolver::new()
            .resolve(&metadata, &ctx)
            .await
            .unwrap();

        assert!(args.context.is_some());
        assert!(args.values.is_empty());
    }
}

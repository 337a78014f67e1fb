// Handler metadata: what kind of handler this is and how it wants to be called
//
// Built once per route registration (or per custom-handler creation) and
// shared read-only across every invocation of that route. The type is
// decided at construction and never changes afterwards.

use crate::handler::{CtxCallback, NativeCallback, ParamsCallback};
use std::collections::HashMap;
use std::sync::Arc;

/// Closed set of handler kinds the pipeline dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    /// Route endpoint; when final, its result terminates the chain.
    Endpoint,
    /// Chain middleware with resolved arguments.
    Middleware,
    /// Middleware that declares an error parameter; runs only on the error path.
    ErrMiddleware,
    /// Invoked with the bare context, no argument resolution.
    CtxFn,
    /// Native 3-arg function passed through to the transport unchanged.
    RawFn,
    /// Native error-first 4-arg function passed through unchanged.
    RawErrFn,
    /// Ad-hoc injectable handler created outside the route table.
    Custom,
}

/// Declared parameter shape for a metadata-declared handler.
///
/// Supplied by the registration layer; `Err` and `Next` drive the derived
/// flags, the rest drive default argument resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// The pending error (promotes the handler to ErrMiddleware).
    Err,
    /// The chain continuation.
    Next,
    /// The whole request context.
    Context,
    /// A named query parameter.
    Query(String),
    /// A named request header.
    Header(String),
    /// The request path.
    Path,
    /// The request method.
    Method,
}

/// The already-resolved target of a handler.
#[derive(Clone)]
pub enum HandlerCallable {
    Params(ParamsCallback),
    Ctx(CtxCallback),
    Native(NativeCallback),
}

impl std::fmt::Debug for HandlerCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerCallable::Params(_) => write!(f, "HandlerCallable::Params(..)"),
            HandlerCallable::Ctx(_) => write!(f, "HandlerCallable::Ctx(..)"),
            HandlerCallable::Native(_) => write!(f, "HandlerCallable::Native(..)"),
        }
    }
}

/// Immutable description of one handler.
#[derive(Debug)]
pub struct HandlerMetadata {
    name: String,
    kind: HandlerType,
    callable: HandlerCallable,
    params: Vec<ParamType>,
    has_next_function: bool,
    is_final: bool,
    response_status: Option<u16>,
    response_headers: HashMap<String, String>,
}

impl HandlerMetadata {
    /// Start building metadata. `name` is the diagnostic label, typically
    /// `Target.method`.
    pub fn builder(name: impl Into<String>) -> HandlerMetadataBuilder {
        HandlerMetadataBuilder {
            name: name.into(),
            kind: None,
            callable: None,
            params: Vec::new(),
            arity: None,
            is_final: false,
            response_status: None,
            response_headers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HandlerType {
        self.kind
    }

    pub fn callable(&self) -> &HandlerCallable {
        &self.callable
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Whether this handler consumes the pending error.
    pub fn has_error_param(&self) -> bool {
        matches!(self.kind, HandlerType::ErrMiddleware | HandlerType::RawErrFn)
    }

    pub fn has_next_function(&self) -> bool {
        self.has_next_function
    }

    pub fn is_endpoint(&self) -> bool {
        self.kind == HandlerType::Endpoint
    }

    pub fn is_raw_middleware(&self) -> bool {
        matches!(self.kind, HandlerType::RawFn | HandlerType::RawErrFn)
    }

    pub fn is_ctx_fn(&self) -> bool {
        self.kind == HandlerType::CtxFn
    }

    /// Final endpoints emit the response once the chain reaches them.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Status declared on the route, applied at header finalization.
    pub fn response_status(&self) -> Option<u16> {
        self.response_status
    }

    /// Headers declared on the route, applied at header finalization.
    pub fn response_headers(&self) -> &HashMap<String, String> {
        &self.response_headers
    }
}

impl std::fmt::Display for HandlerMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Builder applying the type-derivation rules at `build()` time.
pub struct HandlerMetadataBuilder {
    name: String,
    kind: Option<HandlerType>,
    callable: Option<HandlerCallable>,
    params: Vec<ParamType>,
    arity: Option<usize>,
    is_final: bool,
    response_status: Option<u16>,
    response_headers: HashMap<String, String>,
}

impl HandlerMetadataBuilder {
    pub fn kind(mut self, kind: HandlerType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set a metadata-declared target (endpoint/middleware shape).
    pub fn params_callable(mut self, callable: ParamsCallback) -> Self {
        self.callable = Some(HandlerCallable::Params(callable));
        self
    }

    /// Set a context-function target.
    pub fn ctx_callable(mut self, callable: CtxCallback) -> Self {
        self.callable = Some(HandlerCallable::Ctx(callable));
        self.kind.get_or_insert(HandlerType::CtxFn);
        self
    }

    /// Set a bare native target with its declared parameter count.
    ///
    /// Rust closures carry no introspectable arity, so the registration
    /// layer states it; 4 parameters means error-first, 3 or more means the
    /// function takes the continuation. This compatibility rule exists only
    /// for the native-adapter boundary.
    pub fn native_callable(mut self, callable: NativeCallback, arity: usize) -> Self {
        self.callable = Some(HandlerCallable::Native(callable));
        self.arity = Some(arity);
        self
    }

    /// Add one declared parameter.
    pub fn param(mut self, param: ParamType) -> Self {
        self.params.push(param);
        self
    }

    /// Replace the declared parameter list.
    pub fn params(mut self, params: Vec<ParamType>) -> Self {
        self.params = params;
        self
    }

    /// Mark this endpoint's result as the terminal response.
    pub fn final_endpoint(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn response_status(mut self, status: u16) -> Self {
        self.response_status = Some(status);
        self
    }

    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Arc<HandlerMetadata> {
        let callable = self
            .callable
            .expect("HandlerMetadata requires a callable target");

        let mut kind = self.kind.unwrap_or(match &callable {
            HandlerCallable::Params(_) => HandlerType::Middleware,
            HandlerCallable::Ctx(_) => HandlerType::CtxFn,
            HandlerCallable::Native(_) => HandlerType::RawFn,
        });

        let has_next_function;
        match &callable {
            HandlerCallable::Native(_) => {
                let arity = self.arity.unwrap_or(3);
                if arity == 4 {
                    kind = HandlerType::RawErrFn;
                }
                has_next_function = arity >= 3;
            }
            _ => {
                has_next_function = self.params.contains(&ParamType::Next);
                if self.params.contains(&ParamType::Err) {
                    kind = HandlerType::ErrMiddleware;
                }
            }
        }

        Arc::new(HandlerMetadata {
            name: self.name,
            kind,
            callable,
            params: self.params,
            has_next_function,
            is_final: self.is_final,
            response_status: self.response_status,
            response_headers: self.response_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{native_callback, params_callback, HandlerValue, ResolvedArgs};

    fn noop_params() -> ParamsCallback {
        params_callback(|_args: ResolvedArgs| async { Ok(HandlerValue::None) })
    }

    #[test]
    fn test_endpoint_metadata() {
        let metadata = HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(noop_params())
            .build();

        assert!(metadata.is_endpoint());
        assert!(!metadata.has_error_param());
        assert!(!metadata.is_raw_middleware());
        assert_eq!(metadata.to_string(), "Test.get");
    }

    #[test]
    fn test_err_param_promotes_to_error_middleware() {
        let metadata = HandlerMetadata::builder("Test.use")
            .kind(HandlerType::Middleware)
            .params_callable(noop_params())
            .param(ParamType::Err)
            .build();

        assert_eq!(metadata.kind(), HandlerType::ErrMiddleware);
        assert!(metadata.has_error_param());
    }

    #[test]
    fn test_next_param_sets_flag() {
        let metadata = HandlerMetadata::builder("Test.use")
            .kind(HandlerType::Middleware)
            .params_callable(noop_params())
            .param(ParamType::Next)
            .build();

        assert!(metadata.has_next_function());
        assert!(!metadata.has_error_param());
    }

    #[test]
    fn test_raw_arity_four_is_error_first() {
        let metadata = HandlerMetadata::builder("rawErr")
            .native_callable(native_callback(|_call| async {}), 4)
            .build();

        assert_eq!(metadata.kind(), HandlerType::RawErrFn);
        assert!(metadata.has_error_param());
        assert!(metadata.has_next_function());
        assert!(metadata.is_raw_middleware());
    }

    #[test]
    fn test_raw_arity_three_has_next() {
        let metadata = HandlerMetadata::builder("raw")
            .native_callable(native_callback(|_call| async {}), 3)
            .build();

        assert_eq!(metadata.kind(), HandlerType::RawFn);
        assert!(!metadata.has_error_param());
        assert!(metadata.has_next_function());
    }

    #[test]
    fn test_raw_arity_two_has_no_next() {
        let metadata = HandlerMetadata::builder("raw")
            .native_callable(native_callback(|_call| async {}), 2)
            .build();

        assert_eq!(metadata.kind(), HandlerType::RawFn);
        assert!(!metadata.has_next_function());
    }

    #[test]
    fn test_final_endpoint_with_declared_response() {
        let metadata = HandlerMetadata::builder("Test.get")
            .kind(HandlerType::Endpoint)
            .params_callable(noop_params())
            .final_endpoint(true)
            .response_status(203)
            .response_header("x-test", "1")
            .build();

        assert!(metadata.is_final());
        assert_eq!(metadata.response_status(), Some(203));
        assert_eq!(
            metadata.response_headers().get("x-test"),
            Some(&"1".to_string())
        );
    }
}

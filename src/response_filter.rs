// Response serialization capability
//
// Flush runs the working data through `serialize` then `transform` before
// writing. Content negotiation and model serialization live outside this
// core; the default filter passes data through untouched.

use crate::context::Context;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;

/// The serialize/transform capability consumed by flush.
#[async_trait]
pub trait ResponseFilter: Send + Sync {
    /// First pass: turn the handler's working data into its wire shape.
    async fn serialize(&self, data: Option<Value>, ctx: &Context) -> Result<Option<Value>, Error>;

    /// Second pass: apply a final transformation before the write.
    async fn transform(&self, data: Option<Value>, ctx: &Context) -> Result<Option<Value>, Error>;
}

/// Identity filter: JSON data goes out as-is.
#[derive(Default)]
pub struct JsonResponseFilter;

impl JsonResponseFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResponseFilter for JsonResponseFilter {
    async fn serialize(&self, data: Option<Value>, _ctx: &Context) -> Result<Option<Value>, Error> {
        Ok(data)
    }

    async fn transform(&self, data: Option<Value>, _ctx: &Context) -> Result<Option<Value>, Error> {
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http::{native_pair, NativeRequest};
    use serde_json::json;

    #[tokio::test]
    async fn test_json_filter_is_identity() {
        let (request, response) = native_pair(NativeRequest::new("GET", "/test"));
        let ctx = Context::new(request, response);
        let filter = JsonResponseFilter::new();

        let data = filter.serialize(Some(json!("x")), &ctx).await.unwrap();
        let data = filter.transform(data, &ctx).await.unwrap();
        assert_eq!(data, Some(json!("x")));

        let none = filter.serialize(None, &ctx).await.unwrap();
        assert_eq!(none, None);
    }
}

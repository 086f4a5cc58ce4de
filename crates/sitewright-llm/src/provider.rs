use async_trait::async_trait;

use crate::{Request, Response};
use sitewright_types::SitewrightError;

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, SitewrightError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_vision(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, SitewrightError> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_vision(&self) -> bool {
        self.0.supports_vision()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Message, Usage};
    use std::collections::HashMap;

    struct MockProvider;

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, _request: &Request) -> Result<Response, SitewrightError> {
            Ok(Response {
                id: "mock-resp-1".into(),
                text: "Hello from mock".into(),
                usage: Usage::default(),
                model: "mock-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_vision(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn dyn_provider_complete() {
        let provider = DynProvider::new(MockProvider);
        let req = Request::new("mock-model", vec![Message::user("hi")]);
        let resp = provider.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp-1");
        assert_eq!(resp.text, "Hello from mock");
    }

    #[tokio::test]
    async fn dyn_provider_in_hashmap() {
        let mut providers: HashMap<String, DynProvider> = HashMap::new();
        providers.insert("mock".into(), DynProvider::new(MockProvider));

        let provider = providers.get("mock").unwrap();
        assert_eq!(provider.name(), "mock");
        assert!(!provider.supports_vision());
    }
}

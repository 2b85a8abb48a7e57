//! Shared mocks for swarm tests
#![allow(dead_code)]

use async_trait::async_trait;
use fusion_config::{LlmSettings, SwarmSettings};
use fusion_provider::{ChatRequest, Llm, Provider, ProviderError, RetryPolicy};
use mockall::mock;
use std::sync::{Arc, Mutex};

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;
        fn name(&self) -> &str;
    }
}

pub const BROWSER_MODEL: &str = "mistral:latest";
pub const RESEARCH_MODEL: &str = "deepseek-r1:latest";
pub const SYNTHESIS_MODEL: &str = "llama3:8b";

pub type Requests = Arc<Mutex<Vec<ChatRequest>>>;

/// Mock that answers per model and records every request; a model mapped to
/// `None` fails
pub fn routed_provider(routes: Vec<(&'static str, Option<&'static str>)>) -> (MockProvider, Requests) {
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    let mut mock = MockProvider::new();
    mock.expect_name().return_const("mock".to_string());
    mock.expect_chat().returning(move |request: ChatRequest| {
        let model = request.model.clone();
        seen.lock().unwrap().push(request);
        match routes.iter().find(|(name, _)| *name == model) {
            Some((_, Some(reply))) => Ok(reply.to_string()),
            _ => Err(ProviderError::Api {
                status: 500,
                message: format!("{} is down", model),
            }),
        }
    });
    (mock, requests)
}

pub fn offline_provider() -> MockProvider {
    let mut mock = MockProvider::new();
    mock.expect_name().return_const("mock".to_string());
    mock.expect_chat().returning(|_| {
        Err(ProviderError::Api {
            status: 503,
            message: "offline".to_string(),
        })
    });
    mock
}

/// Base gateway with a single attempt per request
pub fn base_llm(provider: MockProvider) -> Arc<Llm> {
    Arc::new(Llm::new(Arc::new(provider), &LlmSettings::default()).with_retry(RetryPolicy::immediate(1)))
}

pub fn settings() -> SwarmSettings {
    SwarmSettings::default()
}

pub fn recorded(requests: &Requests) -> Vec<ChatRequest> {
    requests.lock().unwrap().clone()
}

pub fn prompt(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .filter_map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n")
}

//! Shared fixtures for agent integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use fusion_config::LlmSettings;
use fusion_provider::{ChatRequest, Llm, Provider, ProviderError, RetryPolicy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays scripted replies in order; the last reply repeats forever
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: &[Result<&str, &str>]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with `text`
    pub fn constant(text: &str) -> Arc<Self> {
        Self::new(&[Ok(text)])
    }

    /// Never answers
    pub fn offline() -> Arc<Self> {
        Self::new(&[Err("connection refused")])
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ProviderError::Api {
                status: 503,
                message,
            }),
            None => Err(ProviderError::InvalidResponse("no script".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Gateway over `provider` that retries without waiting
pub fn llm(provider: Arc<ScriptedProvider>) -> Arc<Llm> {
    Arc::new(Llm::new(provider, &LlmSettings::default()).with_retry(RetryPolicy::immediate(2)))
}

/// Tool-call envelope as a model would print it
pub fn envelope(name: &str, arguments: &str) -> String {
    serde_json::json!({
        "tool_calls": [{
            "id": "call_test0001",
            "type": "function",
            "function": { "name": name, "arguments": arguments }
        }]
    })
    .to_string()
}

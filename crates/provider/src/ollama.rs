//! Ollama transport
//!
//! POST `{base_url}/api/chat`, either as one JSON document or as a stream of
//! newline-delimited JSON chunks.

use crate::*;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use fusion_config::LlmSettings;

/// Model advertised by `/api/tags`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let settings = LlmSettings::default();
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            stream_timeout: Duration::from_secs(settings.stream_timeout_secs),
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            stream_timeout: Duration::from_secs(settings.stream_timeout_secs),
            ..Self::new(settings.base_url.clone())
        }
    }

    pub fn with_timeouts(mut self, request: Duration, stream: Duration) -> Self {
        self.request_timeout = request;
        self.stream_timeout = stream;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &ChatRequest) -> serde_json::Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "stream": request.stream,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        })
    }

    fn transport_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(timeout.as_secs())
        } else {
            ProviderError::Request(e)
        }
    }

    async fn reject(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(body);
        ProviderError::Api { status, message }
    }

    async fn post(&self, body: &serde_json::Value, timeout: Duration) -> Result<Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        Ok(response)
    }

    async fn chat_once(&self, body: serde_json::Value) -> Result<String> {
        let response = self.post(&body, self.request_timeout).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::transport_error(e, self.request_timeout))?;

        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("no message.content in {}", json))
            })
    }

    async fn chat_stream(&self, body: serde_json::Value) -> Result<String> {
        let mut response = self.post(&body, self.stream_timeout).await?;

        let mut buffer: Vec<u8> = Vec::new();
        let mut collected = String::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::transport_error(e, self.stream_timeout))?
        {
            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                append_chunk(&line, &mut collected);
            }
        }
        append_chunk(&buffer, &mut collected);

        let full = collected.trim();
        if full.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "empty streamed response".to_string(),
            ));
        }
        Ok(full.to_string())
    }

    /// Models installed on the endpoint
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, self.request_timeout))?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        let tags: TagsResponse = response.json().await?;
        info!("◆ {} MODELS AVAILABLE AT {}", tags.models.len(), self.base_url);
        for model in &tags.models {
            debug!("  - {} ({} bytes)", model.name, model.size);
        }
        Ok(tags.models)
    }

    /// Whether `model` answers a tiny chat
    pub async fn ping(&self, model: &str) -> bool {
        let body = json!({
            "model": model,
            "messages": [Message::user("Hello, are you working?")],
            "stream": false,
        });

        match self.post(&body, Duration::from_secs(30)).await {
            Ok(_) => {
                info!("◆ {} RESPONDING AT {}", model, self.base_url);
                true
            }
            Err(e) => {
                warn!("◆ {} NOT RESPONDING: {}", model, e);
                false
            }
        }
    }
}

/// Append the `message.content` of one streamed line
fn append_chunk(line: &[u8], collected: &mut String) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(chunk) => {
            if let Some(piece) = chunk["message"]["content"].as_str() {
                trace!("{}", piece);
                collected.push_str(piece);
            }
        }
        Err(_) => warn!("Failed to parse streamed chunk: {}", text),
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        trace!("◆ CONTACTING {} WITH MODEL {}", self.base_url, request.model);
        let body = self.build_request(&request);

        if request.stream {
            self.chat_stream(body).await
        } else {
            self.chat_once(body).await
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn request(stream: bool) -> ChatRequest {
        ChatRequest {
            model: "mistral:latest".to_string(),
            messages: vec![Message::system("rules"), Message::user("Hello")],
            stream,
            temperature: 0.3,
            max_tokens: 512,
        }
    }

    #[test]
    fn test_build_request_shape() {
        let provider = OllamaProvider::new("http://localhost:11434/");
        let body = provider.build_request(&request(false));

        assert_eq!(provider.base_url(), "http://localhost:11434");
        assert_eq!(body["model"], "mistral:latest");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 512);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "Hello"}));
    }

    #[test]
    fn test_from_settings_uses_configured_timeouts() {
        let settings = LlmSettings {
            base_url: "http://gpu-box:11434".to_string(),
            request_timeout_secs: 5,
            stream_timeout_secs: 9,
            ..Default::default()
        };
        let provider = OllamaProvider::from_settings(&settings);

        assert_eq!(provider.base_url(), "http://gpu-box:11434");
        assert_eq!(provider.request_timeout, Duration::from_secs(5));
        assert_eq!(provider.stream_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_append_chunk_skips_garbage() {
        let mut collected = String::new();
        append_chunk(br#"{"message":{"content":"Hel"}}"#, &mut collected);
        append_chunk(b"not json", &mut collected);
        append_chunk(br#"{"done":true}"#, &mut collected);
        append_chunk(br#"{"message":{"content":"lo"}}"#, &mut collected);
        assert_eq!(collected, "Hello");
    }

    #[tokio::test]
    async fn test_chat_non_stream() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "mistral:latest", "stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":{"role":"assistant","content":"4"},"done":true}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        let text = provider.chat(request(false)).await.unwrap();

        assert_eq!(text, "4");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_missing_content_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        let err = provider.chat(request(false)).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_chat_stream_concatenates_chunks() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "{\"message\":{\"content\":\"The answer\"}}\n",
            "{\"message\":{\"content\":\" is 4.\"}}\n",
            "garbage\n",
            "{\"done\":true}\n"
        );
        server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        let text = provider.chat(request(true)).await.unwrap();
        assert_eq!(text, "The answer is 4.");
    }

    #[tokio::test]
    async fn test_chat_stream_empty_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("{\"done\":true}\n")
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        let err = provider.chat(request(true)).await.unwrap_err();
        assert!(err.to_string().contains("empty streamed response"));
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model 'nope' not found"}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        match provider.chat(request(false)).await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "model 'nope' not found");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"mistral:latest","size":4109865159},{"name":"llama3:8b"}]}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        let models = provider.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "mistral:latest");
        assert_eq!(models[0].size, 4_109_865_159);
        assert_eq!(models[1].size, 0);
    }

    #[tokio::test]
    async fn test_ping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "llama3:8b"})))
            .with_status(200)
            .with_body(r#"{"message":{"content":"yes"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "missing"})))
            .with_status(404)
            .with_body(r#"{"error":"not found"}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(server.url());
        assert!(provider.ping("llama3:8b").await);
        assert!(!provider.ping("missing").await);
    }
}

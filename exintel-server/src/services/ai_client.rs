//! Chat-completion client for the xAI API
//!
//! The API is OpenAI-compatible: `POST {base_url}/chat/completions` with a
//! bearer key. Callers depend on the `ChatModel` trait so tests can script
//! model output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = concat!("exintel/", env!("CARGO_PKG_VERSION"));

/// AI client errors
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    /// `data:` URL of an image placed before the user text
    pub image_data_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text completion collaborator
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the raw message text
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize, Serialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// xAI API client
pub struct XaiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl XaiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Request body in the OpenAI chat format
fn request_body(request: &ChatRequest) -> Value {
    let user_content = match &request.image_data_url {
        Some(url) => json!([
            { "type": "image_url", "image_url": { "url": url } },
            { "type": "text", "text": request.user_text },
        ]),
        None => json!(request.user_text),
    };

    json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": user_content },
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

#[async_trait]
impl ChatModel for XaiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(model = %request.model, url = %url, "Querying xAI API");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Api(status.as_u16(), error_text));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

/// Strip Markdown code fences the model sometimes wraps JSON in
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`) up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```\n{\"a\":1}```  "), "{\"a\":1}");
    }

    #[test]
    fn test_request_body_with_image() {
        let request = ChatRequest {
            model: "grok-2-vision-1212".to_string(),
            system_prompt: "sys".to_string(),
            user_text: "describe".to_string(),
            image_data_url: Some("data:image/png;base64,AAAA".to_string()),
            temperature: 0.1,
            max_tokens: 500,
        };

        let body = request_body(&request);
        assert_eq!(body["model"], "grok-2-vision-1212");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert_eq!(body["messages"][1]["content"][1]["text"], "describe");
        assert_eq!(body["max_tokens"], 500);
    }

    #[test]
    fn test_request_body_text_only() {
        let request = ChatRequest {
            model: "grok-3-mini".to_string(),
            system_prompt: "sys".to_string(),
            user_text: "check".to_string(),
            image_data_url: None,
            temperature: 0.2,
            max_tokens: 2000,
        };

        assert_eq!(request_body(&request)["messages"][1]["content"], "check");
    }

    #[test]
    fn test_client_creation() {
        assert!(XaiClient::new("https://api.x.ai/v1/", "key").is_ok());
    }
}

// src/gemini/mod.rs
//! Completion service access
//!
//! [`CompletionBackend`] is the seam between the reply service and the
//! network. [`GeminiClient`] talks to the generateContent REST endpoint.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

pub mod reply;
pub mod session;
pub mod types;

pub use reply::{MagicReply, ReplyService, FALLBACK_REPLY, SYSTEM_INSTRUCTION};
pub use session::{ConversationHandle, SessionRegistry};
pub use types::Content;

use types::{push_turn, ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("response contained no text")]
    EmptyResponse,
    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),
}

/// A completion service able to continue a conversation and to produce
/// schema-constrained JSON
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `message` as a new user turn after `history` and return the
    /// model's text
    async fn chat(&self, system_instruction: &str, history: &[Content], message: &str) -> Result<String, GeminiError>;

    /// Single-shot completion constrained to `schema`, returns the raw JSON text
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<String, GeminiError>;
}

/// Build the request body for a conversation turn
pub fn chat_request(system_instruction: &str, history: &[Content], message: &str) -> GenerateContentRequest {
    let mut contents = history.to_vec();
    push_turn(&mut contents, "user", message);
    GenerateContentRequest {
        system_instruction: Some(Content::instruction(system_instruction)),
        contents,
        generation_config: None,
    }
}

/// Build the request body for a structured JSON completion
pub fn json_request(prompt: &str, schema: &Value) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: None,
        contents: vec![Content::new("user", prompt)],
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema.clone()),
        }),
    }
}

/// Turn a non-success response body into an error message, preferring the
/// API's own error text
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            if envelope.error.status.is_empty() {
                envelope.error.message
            } else {
                format!("{} ({})", envelope.error.message, envelope.error.status)
            }
        }
        _ => body.chars().take(200).collect(),
    }
}

/// Extract the generated text, classifying blocked and empty responses
pub fn response_text(response: &GenerateContentResponse) -> Result<String, GeminiError> {
    if let Some(text) = response.text() {
        return Ok(text);
    }
    match response.block_reason() {
        Some(reason) => Err(GeminiError::Blocked(reason.to_string())),
        None => Err(GeminiError::EmptyResponse),
    }
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GeminiError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(GeminiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, GeminiError> {
        let url = self.endpoint();
        debug!("POST {} ({} turns)", url, request.contents.len());

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("Gemini error {}: {}", status.as_u16(), body.chars().take(500).collect::<String>());
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        response_text(&parsed)
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn chat(&self, system_instruction: &str, history: &[Content], message: &str) -> Result<String, GeminiError> {
        self.generate(&chat_request(system_instruction, history, message)).await
    }

    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<String, GeminiError> {
        self.generate(&json_request(prompt, schema)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "http://localhost:9999/v1beta/".to_string(),
            timeout: Duration::from_secs(1),
            data_dir: PathBuf::from("/tmp/aurachat-test"),
        }
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new(&config()).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_chat_request_appends_user_turn() {
        let history = vec![Content::new("user", "hi"), Content::new("model", "hello!")];
        let request = chat_request("be brief", &history, "how are you?");

        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[2].role(), "user");
        assert_eq!(request.contents[2].text(), "how are you?");
        assert!(request.generation_config.is_none());
    }

    #[test]
    fn test_chat_request_merges_trailing_user_turn() {
        // A poll sent by the user has no reply, so history can end on a user turn
        let history = vec![Content::new("user", "Poll: Lunch?")];
        let request = chat_request("be brief", &history, "well?");

        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].parts.len(), 2);
    }

    #[test]
    fn test_json_request_sets_schema() {
        let schema = json!({"type": "OBJECT"});
        let request = json_request("summarize", &schema);
        let config = request.generation_config.unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        assert_eq!(config.response_schema, Some(schema));
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_message(body), "Quota exceeded (RESOURCE_EXHAUSTED)");
        assert_eq!(api_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_response_text_classification() {
        let blocked: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(matches!(response_text(&blocked), Err(GeminiError::Blocked(reason)) if reason == "SAFETY"));

        let empty: GenerateContentResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(response_text(&empty), Err(GeminiError::EmptyResponse)));
    }
}

// Common test utilities for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, LevelFilter};
use serde_json::Value;

use aurachat::chat::ChatSession;
use aurachat::gemini::{CompletionBackend, Content, GeminiError};
use aurachat::storage::{KeyValueStore, MemoryStore};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// One recorded `chat` call
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub system_instruction: String,
    pub history: Vec<Content>,
    pub message: String,
}

/// Backend that answers from queued responses and records every call.
/// With nothing queued, `chat` answers `reply to <message>` and
/// `generate_json` fails.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GeminiError>>>,
    json: Mutex<VecDeque<Result<String, GeminiError>>>,
    chat_calls: Mutex<Vec<ChatCall>>,
    json_prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        ScriptedBackend {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: Result<String, GeminiError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_json(&self, raw: Result<String, GeminiError>) {
        self.json.lock().unwrap().push_back(raw);
    }

    pub fn chat_calls(&self) -> Vec<ChatCall> {
        self.chat_calls.lock().unwrap().clone()
    }

    pub fn json_prompts(&self) -> Vec<String> {
        self.json_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn chat(&self, system_instruction: &str, history: &[Content], message: &str) -> Result<String, GeminiError> {
        self.chat_calls.lock().unwrap().push(ChatCall {
            system_instruction: system_instruction.to_string(),
            history: history.to_vec(),
            message: message.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.replies.lock().unwrap().pop_front();
        debug!("Scripted chat reply for {:?}: {:?}", message, queued);
        queued.unwrap_or_else(|| Ok(format!("reply to {}", message)))
    }

    async fn generate_json(&self, prompt: &str, _schema: &Value) -> Result<String, GeminiError> {
        self.json_prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.json.lock().unwrap().pop_front();
        queued.unwrap_or(Err(GeminiError::EmptyResponse))
    }
}

/// The error a rate-limited API answers with
pub fn quota_error() -> GeminiError {
    GeminiError::Api {
        status: 429,
        message: "Resource has been exhausted".to_string(),
    }
}

/// Session for `asha` over an in-memory store
pub fn memory_session(backend: Arc<ScriptedBackend>) -> (Arc<MemoryStore>, ChatSession) {
    let store = Arc::new(MemoryStore::new());
    let session = ChatSession::new("asha", store.clone() as Arc<dyn KeyValueStore>, backend);
    (store, session)
}

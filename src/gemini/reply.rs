// src/gemini/reply.rs
//! Auto-replies and conversation summaries

use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::session::SessionRegistry;
use super::{CompletionBackend, GeminiError};
use crate::models::{Message, MessageAuthor};

pub const SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful contact in a chat application. \
Keep your responses concise and conversational, like a real person texting.";

pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble connecting right now. Please try again later.";

pub const NO_CONVERSATION_SUMMARY: &str = "No conversation yet.";
pub const SUMMARY_FAILED: &str = "Could not generate summary.";
pub const CANNED_SUGGESTIONS: [&str; 3] = ["Hello!", "How are you?", "What's up?"];

/// Number of trailing messages a summary looks at
pub const SUMMARY_WINDOW: usize = 10;
pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagicReply {
    pub summary: String,
    pub suggestions: Vec<String>,
}

impl MagicReply {
    fn canned() -> Self {
        MagicReply {
            summary: NO_CONVERSATION_SUMMARY.to_string(),
            suggestions: CANNED_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn failed() -> Self {
        MagicReply {
            summary: SUMMARY_FAILED.to_string(),
            suggestions: Vec::new(),
        }
    }
}

pub fn magic_reply_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A one-sentence summary of the conversation."
            },
            "suggestions": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Three distinct, short reply suggestions for the user."
            }
        },
        "required": ["summary", "suggestions"]
    })
}

/// Prompt over the last [`SUMMARY_WINDOW`] messages, one `speaker: text` line each
pub fn build_summary_prompt(history: &[Message], username: &str) -> String {
    let start = history.len().saturating_sub(SUMMARY_WINDOW);
    let transcript = history[start..]
        .iter()
        .map(|message| {
            let speaker = match message.author {
                MessageAuthor::User => username,
                MessageAuthor::Contact => "Contact",
            };
            format!("{}: {}", speaker, message.content())
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following chat conversation, provide a one-sentence summary and 3 distinct, \
short reply suggestions for {}.\n\nConversation:\n{}",
        username, transcript
    )
}

/// Decode the structured completion, keeping at most three suggestions
pub fn parse_magic_reply(raw: &str) -> Result<MagicReply, GeminiError> {
    let mut reply: MagicReply = serde_json::from_str(raw.trim())?;
    reply.suggestions.truncate(MAX_SUGGESTIONS);
    Ok(reply)
}

pub struct ReplyService {
    backend: Arc<dyn CompletionBackend>,
    registry: SessionRegistry,
}

impl ReplyService {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        ReplyService {
            backend,
            registry: SessionRegistry::new(SYSTEM_INSTRUCTION),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Generate the contact's reply to `message_text`. `history` seeds the
    /// conversation the first time a contact is seen and must not include
    /// `message_text` itself. Never fails: errors produce [`FALLBACK_REPLY`].
    pub async fn reply(&self, contact_id: &str, message_text: &str, history: &[Message]) -> String {
        match self.try_reply(contact_id, message_text, history).await {
            Ok(text) => text,
            Err(e) => {
                error!("Error getting reply for {}: {}", contact_id, e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn try_reply(&self, contact_id: &str, message_text: &str, history: &[Message]) -> Result<String, GeminiError> {
        let handle = self.registry.get_or_create(contact_id, history);
        let mut handle = handle.lock().await;

        let text = self
            .backend
            .chat(handle.system_instruction(), handle.turns(), message_text)
            .await?;
        handle.record_exchange(message_text, &text);
        debug!("Reply for {} ({} chars)", contact_id, text.len());
        Ok(text)
    }

    /// Summary of the recent conversation plus up to three reply suggestions
    pub async fn summarize_and_suggest(&self, history: &[Message], username: &str) -> MagicReply {
        if history.is_empty() {
            return MagicReply::canned();
        }

        let prompt = build_summary_prompt(history, username);
        let result = match self.backend.generate_json(&prompt, &magic_reply_schema()).await {
            Ok(raw) => parse_magic_reply(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => {
                info!("Generated summary with {} suggestions", reply.suggestions.len());
                reply
            }
            Err(e) => {
                error!("Error getting magic reply: {}", e);
                MagicReply::failed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                let author = if i % 2 == 0 { MessageAuthor::User } else { MessageAuthor::Contact };
                Message::text(author, format!("message {}", i))
            })
            .collect()
    }

    #[test]
    fn test_summary_prompt_uses_last_ten() {
        let prompt = build_summary_prompt(&conversation(14), "asha");

        assert!(!prompt.contains("message 3\n"));
        assert!(prompt.contains("asha: message 4"));
        assert!(prompt.contains("Contact: message 13"));
        assert_eq!(prompt.lines().filter(|l| l.contains(": message ")).count(), 10);
        assert!(prompt.contains("reply suggestions for asha"));
    }

    #[test]
    fn test_parse_magic_reply_truncates() {
        let raw = r#"{"summary":"They talked about lunch.","suggestions":["a","b","c","d"]}"#;
        let reply = parse_magic_reply(raw).unwrap();
        assert_eq!(reply.summary, "They talked about lunch.");
        assert_eq!(reply.suggestions, vec!["a", "b", "c"]);

        assert!(parse_magic_reply("not json").is_err());
        assert!(parse_magic_reply(r#"{"summary":"only"}"#).is_err());
    }

    #[test]
    fn test_schema_requires_both_fields() {
        let schema = magic_reply_schema();
        assert_eq!(schema["required"], json!(["summary", "suggestions"]));
        assert_eq!(schema["properties"]["suggestions"]["items"]["type"], "STRING");
    }
}

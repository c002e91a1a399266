// src/gemini/session.rs
//! Per-contact conversation handles

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::types::{push_turn, Content};
use crate::models::Message;

/// Accumulated turns of one conversation with the completion service
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    contact_id: String,
    system_instruction: String,
    turns: Vec<Content>,
}

impl ConversationHandle {
    /// Seed a handle by replaying stored messages. Messages with empty
    /// content are skipped and same-role neighbours are merged.
    pub fn from_history(contact_id: &str, system_instruction: &str, history: &[Message]) -> Self {
        let mut turns = Vec::new();
        for message in history {
            let content = message.content();
            if content.trim().is_empty() {
                continue;
            }
            push_turn(&mut turns, message.author.role(), &content);
        }

        ConversationHandle {
            contact_id: contact_id.to_string(),
            system_instruction: system_instruction.to_string(),
            turns,
        }
    }

    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn turns(&self) -> &[Content] {
        &self.turns
    }

    /// Record a completed exchange. Only called after the completion succeeded.
    pub fn record_exchange(&mut self, user_text: &str, reply_text: &str) {
        push_turn(&mut self.turns, "user", user_text);
        push_turn(&mut self.turns, "model", reply_text);
    }
}

pub type SharedHandle = Arc<tokio::sync::Mutex<ConversationHandle>>;

/// Contact id to conversation handle. Handles live until [`clear`] or until
/// the registry is dropped.
///
/// [`clear`]: SessionRegistry::clear
pub struct SessionRegistry {
    system_instruction: String,
    sessions: Mutex<HashMap<String, SharedHandle>>,
}

impl SessionRegistry {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        SessionRegistry {
            system_instruction: system_instruction.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Existing handle for `contact_id`, or a new one seeded from `history`.
    /// `history` is ignored when a handle already exists.
    pub fn get_or_create(&self, contact_id: &str, history: &[Message]) -> SharedHandle {
        let mut sessions = self.lock();
        sessions
            .entry(contact_id.to_string())
            .or_insert_with(|| {
                debug!("New conversation for {} seeded with {} messages", contact_id, history.len());
                Arc::new(tokio::sync::Mutex::new(ConversationHandle::from_history(
                    contact_id,
                    &self.system_instruction,
                    history,
                )))
            })
            .clone()
    }

    pub fn contains(&self, contact_id: &str) -> bool {
        self.lock().contains_key(contact_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedHandle>> {
        // The map holds no invariant a panicking holder could break
        self.sessions.lock().unwrap_or_else(|poisoned| {
            warn!("Session registry lock was poisoned");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageAuthor, MessageBody};

    fn history() -> Vec<Message> {
        vec![
            Message::text(MessageAuthor::User, "hi"),
            Message::text(MessageAuthor::Contact, "hello!"),
            Message::text(MessageAuthor::Contact, "   "),
            Message::text(MessageAuthor::Contact, "what's new?"),
            Message::new(MessageAuthor::User, MessageBody::Document { file_name: "plan.pdf".to_string() }),
        ]
    }

    #[test]
    fn test_seed_maps_roles_and_merges() {
        let handle = ConversationHandle::from_history("contact-1", "sys", &history());
        let turns = handle.turns();

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role(), "user");
        assert_eq!(turns[1].role(), "model");
        // Blank message dropped, the two contact messages merged
        assert_eq!(turns[1].parts.len(), 2);
        assert_eq!(turns[2].text(), "plan.pdf");
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_handle() {
        let registry = SessionRegistry::new("sys");
        assert!(registry.is_empty());

        let first = registry.get_or_create("contact-1", &history());
        let second = registry.get_or_create("contact-1", &[]);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.turns().len(), 3);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("contact-1"));
        assert!(!registry.contains("contact-2"));
    }

    #[tokio::test]
    async fn test_record_exchange_and_clear() {
        let registry = SessionRegistry::new("sys");
        let handle = registry.get_or_create("contact-2", &[]);
        {
            let mut handle = handle.lock().await;
            assert!(handle.turns().is_empty());
            handle.record_exchange("hey", "hey yourself");
            assert_eq!(handle.turns().len(), 2);
            assert_eq!(handle.system_instruction(), "sys");
            assert_eq!(handle.contact_id(), "contact-2");
        }

        registry.clear();
        assert!(registry.is_empty());
        let fresh = registry.get_or_create("contact-2", &[]);
        assert!(fresh.lock().await.turns().is_empty());
    }
}

// src/chat/mod.rs
//! Chat session context
//!
//! A [`ChatSession`] belongs to one logged-in user. It owns the reply
//! service (and with it the conversation registry) and the per-contact
//! in-flight guard. The UI holds it in an `Arc` and drops it on logout.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::credentials;
use crate::gemini::{CompletionBackend, MagicReply, ReplyService};
use crate::models::{Contact, Message, MessageAuthor, MessageBody, PollDetails, UserStatus};
use crate::storage::{ChatHistory, KeyValueStore, StorageError};

pub mod attachments;
pub mod contacts;
pub mod events;
pub mod payments;
pub mod polls;
pub mod status;
pub mod theme;

pub use polls::PollError;
pub use theme::{ThemeMode, ThemeSettings};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Still waiting for a reply in {0}")]
    ReplyInFlight(String),
    #[error("Amount must be a number greater than zero")]
    InvalidAmount,
    #[error("A poll needs a question and 2 to 5 options")]
    InvalidPoll,
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("Message {0} not found")]
    MessageNotFound(String),
    #[error("Message {0} is not a poll")]
    NotAPoll(String),
    #[error("Event name is empty")]
    EmptyEventName,
    #[error("Status image is empty")]
    EmptyStatus,
    #[error("Cannot attach {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Marks a contact as waiting for a reply until dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    contact_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.set.lock() {
            Ok(mut set) => {
                set.remove(&self.contact_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.contact_id);
            }
        }
    }
}

pub struct ChatSession {
    username: String,
    store: Arc<dyn KeyValueStore>,
    history: ChatHistory,
    replies: ReplyService,
    in_flight: Mutex<HashSet<String>>,
}

impl ChatSession {
    pub fn new(username: &str, store: Arc<dyn KeyValueStore>, backend: Arc<dyn CompletionBackend>) -> Self {
        info!("Starting chat session for {}", username);
        ChatSession {
            username: username.to_string(),
            history: ChatHistory::new(store.clone(), username),
            store,
            replies: ReplyService::new(backend),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn replies(&self) -> &ReplyService {
        &self.replies
    }

    fn begin_reply(&self, contact_id: &str) -> Result<InFlightGuard<'_>, ChatError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(contact_id.to_string()) {
            return Err(ChatError::ReplyInFlight(contact_id.to_string()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            contact_id: contact_id.to_string(),
        })
    }

    /// Whether a reply for `contact_id` is outstanding
    pub fn is_replying(&self, contact_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(contact_id))
            .unwrap_or(false)
    }

    /// Built-in contacts followed by the active event chats, previews taken
    /// from stored history where there is any
    pub fn contacts(&self) -> Vec<Contact> {
        let now = events::now_ms();
        let mut all = contacts::predefined_contacts();
        all.extend(
            events::load_events(self.store.as_ref(), &self.username)
                .into_iter()
                .filter(|e| events::is_active(e, now)),
        );
        for contact in all.iter_mut() {
            contacts::refresh_preview(contact, &self.history.load(&contact.id));
        }
        all
    }

    pub fn history(&self, contact_id: &str) -> Vec<Message> {
        self.history.load(contact_id)
    }

    /// Send a text message and wait for the contact's reply. Returns the
    /// history with both messages appended.
    pub async fn send_text(&self, contact_id: &str, text: &str) -> Result<Vec<Message>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let _guard = self.begin_reply(contact_id)?;

        let prior = self.history.load(contact_id);
        self.history.append(contact_id, Message::text(MessageAuthor::User, text))?;

        let reply = self.replies.reply(contact_id, text, &prior).await;
        let messages = self.history.append(contact_id, Message::text(MessageAuthor::Contact, reply))?;
        Ok(messages)
    }

    /// Record a simulated payment and the contact's acknowledgement
    pub async fn send_payment(&self, contact_id: &str, amount: &str, note: &str) -> Result<Vec<Message>, ChatError> {
        if payments::parse_amount(amount).is_none() {
            return Err(ChatError::InvalidAmount);
        }
        let _guard = self.begin_reply(contact_id)?;

        let payment = payments::completed_payment(amount, note);
        let thanks = payments::acknowledgement(&payment.amount);
        info!("Payment {} of {} to {}", payment.transaction_id, payment.amount, contact_id);
        self.history
            .append(contact_id, Message::new(MessageAuthor::User, MessageBody::Payment(payment)))?;

        tokio::time::sleep(Duration::from_millis(payments::ACKNOWLEDGE_DELAY_MS)).await;
        let messages = self.history.append(contact_id, Message::text(MessageAuthor::Contact, thanks))?;
        Ok(messages)
    }

    pub fn create_poll(&self, contact_id: &str, question: &str, options: &[String]) -> Result<Vec<Message>, ChatError> {
        let (question, options) = polls::validate_poll(question, options).ok_or(ChatError::InvalidPoll)?;
        let poll = PollDetails::new(&question, &options);
        Ok(self
            .history
            .append(contact_id, Message::new(MessageAuthor::User, MessageBody::Poll(poll)))?)
    }

    /// Count a vote on a poll message. The stored poll is only rewritten
    /// when the vote is accepted.
    pub fn vote(
        &self,
        contact_id: &str,
        message_id: &str,
        option_id: &str,
        voter: MessageAuthor,
    ) -> Result<Vec<Message>, ChatError> {
        let ((), messages) = self.history.modify(contact_id, |messages| {
            let poll = find_poll(messages, message_id)?;
            poll.vote(option_id, voter)?;
            Ok::<_, ChatError>(())
        })?;
        debug!("{:?} voted {} on {}", voter, option_id, message_id);
        Ok(messages)
    }

    /// The contact votes for a random option unless it already voted
    pub fn contact_vote(&self, contact_id: &str, message_id: &str) -> Result<Vec<Message>, ChatError> {
        let poll = self
            .history
            .load(contact_id)
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?
            .poll()
            .cloned()
            .ok_or_else(|| ChatError::NotAPoll(message_id.to_string()))?;

        if poll.has_voted(MessageAuthor::Contact) {
            return Ok(self.history.load(contact_id));
        }
        let option_id = poll.random_option_id()?;
        self.vote(contact_id, message_id, &option_id, MessageAuthor::Contact)
    }

    pub fn send_image(&self, contact_id: &str, path: &Path) -> Result<Vec<Message>, ChatError> {
        let data_url = attachments::read_data_url(path).map_err(|source| attachment_error(path, source))?;
        Ok(self
            .history
            .append(contact_id, Message::new(MessageAuthor::User, MessageBody::Image { data_url }))?)
    }

    pub fn send_document(&self, contact_id: &str, path: &Path) -> Result<Vec<Message>, ChatError> {
        let file_name = attachments::document_name(path).map_err(|source| attachment_error(path, source))?;
        Ok(self
            .history
            .append(contact_id, Message::new(MessageAuthor::User, MessageBody::Document { file_name }))?)
    }

    pub fn send_voice(&self, contact_id: &str, path: &Path, duration_secs: u32) -> Result<Vec<Message>, ChatError> {
        let data_url = attachments::read_data_url(path).map_err(|source| attachment_error(path, source))?;
        Ok(self.history.append(
            contact_id,
            Message::new(MessageAuthor::User, MessageBody::Voice { data_url, duration_secs }),
        )?)
    }

    /// Summary and reply suggestions for the stored conversation
    pub async fn magic_reply(&self, contact_id: &str) -> MagicReply {
        let history = self.history.load(contact_id);
        self.replies.summarize_and_suggest(&history, &self.username).await
    }

    pub fn create_event_chat(&self, name: &str) -> Result<Contact, ChatError> {
        if name.trim().is_empty() {
            return Err(ChatError::EmptyEventName);
        }
        let event = events::new_event_chat(name, events::now_ms());
        let mut list = events::load_events(self.store.as_ref(), &self.username);
        list.push(event.clone());
        events::save_events(self.store.as_ref(), &self.username, &list)?;
        info!("Created event chat {} ({})", event.name, event.id);
        Ok(event)
    }

    /// Drop expired event chats and return the active ones
    pub fn sweep_event_chats(&self) -> Result<Vec<Contact>, ChatError> {
        Ok(events::sweep_events(self.store.as_ref(), &self.username, events::now_ms())?)
    }

    pub fn user_status(&self) -> Option<UserStatus> {
        status::load_status(self.store.as_ref(), &self.username)
    }

    pub fn set_user_status(&self, image: &str) -> Result<UserStatus, ChatError> {
        if image.trim().is_empty() {
            return Err(ChatError::EmptyStatus);
        }
        Ok(status::save_status(self.store.as_ref(), &self.username, image)?)
    }

    pub fn theme(&self) -> ThemeSettings {
        ThemeSettings::load(self.store.as_ref())
    }

    pub fn save_theme(&self, settings: &ThemeSettings) -> Result<(), ChatError> {
        Ok(settings.save(self.store.as_ref())?)
    }

    /// Forget the remembered username and every conversation handle
    pub fn logout(&self) -> Result<(), ChatError> {
        info!("Logging out {}", self.username);
        self.replies.registry().clear();
        credentials::forget_username(self.store.as_ref())?;
        Ok(())
    }
}

fn find_poll<'a>(messages: &'a mut [Message], message_id: &str) -> Result<&'a mut PollDetails, ChatError> {
    let message = messages
        .iter_mut()
        .find(|m| m.id == message_id)
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;
    message
        .poll_mut()
        .ok_or_else(|| ChatError::NotAPoll(message_id.to_string()))
}

fn attachment_error(path: &Path, source: std::io::Error) -> ChatError {
    warn!("Attachment {} failed: {}", path.display(), source);
    ChatError::Attachment {
        path: path.display().to_string(),
        source,
    }
}

/// Latest poll in a conversation
pub fn latest_poll(messages: &[Message]) -> Option<(&Message, &PollDetails)> {
    messages.iter().rev().find_map(|m| m.poll().map(|poll| (m, poll)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{Content, GeminiError};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoBackend;

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn chat(&self, _system: &str, _history: &[Content], message: &str) -> Result<String, GeminiError> {
            Ok(format!("echo: {}", message))
        }

        async fn generate_json(&self, _prompt: &str, _schema: &Value) -> Result<String, GeminiError> {
            Err(GeminiError::EmptyResponse)
        }
    }

    fn session() -> ChatSession {
        ChatSession::new("asha", Arc::new(MemoryStore::new()), Arc::new(EchoBackend))
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let session = session();
        {
            let _guard = session.begin_reply("contact-1").unwrap();
            assert!(session.is_replying("contact-1"));
            assert!(!session.is_replying("contact-2"));
            assert!(matches!(session.begin_reply("contact-1"), Err(ChatError::ReplyInFlight(_))));
        }
        assert!(!session.is_replying("contact-1"));
    }

    #[tokio::test]
    async fn test_send_text_rejects_blank() {
        let session = session();
        assert!(matches!(session.send_text("contact-1", "   ").await, Err(ChatError::EmptyMessage)));
        assert!(session.history("contact-1").is_empty());
    }

    #[tokio::test]
    async fn test_send_text_appends_both_messages() {
        let session = session();
        let messages = session.send_text("contact-1", " hi ").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content(), "hi");
        assert_eq!(messages[1].content(), "echo: hi");
        assert!(!session.is_replying("contact-1"));
    }

    #[test]
    fn test_poll_vote_flow() {
        let session = session();
        let messages = session
            .create_poll("contact-1", "Lunch?", &["Pizza".to_string(), "Dosa".to_string()])
            .unwrap();
        let poll_id = messages[0].id.clone();

        assert!(matches!(
            session.vote("contact-1", "nope", "opt-0", MessageAuthor::User),
            Err(ChatError::MessageNotFound(_))
        ));

        let messages = session.vote("contact-1", &poll_id, "opt-1", MessageAuthor::User).unwrap();
        assert_eq!(messages[0].poll().unwrap().options[1].votes, 1);
        let (latest, _) = latest_poll(&messages).unwrap();
        assert_eq!(latest.id, poll_id);
    }
}

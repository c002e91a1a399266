// src/storage/history.rs
//! Per-contact message history

use std::sync::{Arc, Mutex};

use log::debug;

use super::{keys, read_json_or_default, write_json, KeyValueStore, StorageError};
use crate::models::Message;

/// Message history of one user, one list per contact.
///
/// Every modification is a read-modify-write of the whole list, serialized
/// by an internal lock so a reply landing and a poll vote cannot overwrite
/// each other.
pub struct ChatHistory {
    store: Arc<dyn KeyValueStore>,
    username: String,
    write_lock: Mutex<()>,
}

impl ChatHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, username: &str) -> Self {
        ChatHistory {
            store,
            username: username.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    fn key(&self, contact_id: &str) -> String {
        keys::chat_history(&self.username, contact_id)
    }

    /// Stored messages for a contact, oldest first. Empty when nothing is
    /// stored or the stored value is unreadable.
    pub fn load(&self, contact_id: &str) -> Vec<Message> {
        read_json_or_default(self.store.as_ref(), &self.key(contact_id))
    }

    pub fn save(&self, contact_id: &str, messages: &[Message]) -> Result<(), StorageError> {
        write_json(self.store.as_ref(), &self.key(contact_id), messages)
    }

    /// Append one message and return the resulting history
    pub fn append(&self, contact_id: &str, message: Message) -> Result<Vec<Message>, StorageError> {
        self.modify(contact_id, |messages| {
            messages.push(message);
            Ok::<_, StorageError>(())
        })
        .map(|(_, messages)| messages)
    }

    /// Run `f` against the stored list and persist the result if `f`
    /// succeeds. On error nothing is written.
    pub fn modify<R, E>(
        &self,
        contact_id: &str,
        f: impl FnOnce(&mut Vec<Message>) -> Result<R, E>,
    ) -> Result<(R, Vec<Message>), E>
    where
        E: From<StorageError>,
    {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut messages = self.load(contact_id);
        let result = f(&mut messages)?;
        self.save(contact_id, &messages)?;
        debug!("Saved {} messages for {}", messages.len(), contact_id);
        Ok((result, messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageAuthor;
    use crate::storage::MemoryStore;

    fn history() -> (Arc<MemoryStore>, ChatHistory) {
        let store = Arc::new(MemoryStore::new());
        let history = ChatHistory::new(store.clone(), "asha");
        (store, history)
    }

    #[test]
    fn test_append_preserves_order() {
        let (_store, history) = history();
        history.append("contact-1", Message::text(MessageAuthor::User, "hi")).unwrap();
        let messages = history.append("contact-1", Message::text(MessageAuthor::Contact, "hello!")).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content(), "hi");
        assert_eq!(messages[1].content(), "hello!");
        assert_eq!(history.load("contact-1"), messages);
    }

    #[test]
    fn test_histories_are_scoped_by_contact_and_user() {
        let (store, history) = history();
        history.append("contact-1", Message::text(MessageAuthor::User, "one")).unwrap();

        assert!(history.load("contact-2").is_empty());

        let other_user = ChatHistory::new(store, "ravi");
        assert!(other_user.load("contact-1").is_empty());
    }

    #[test]
    fn test_failed_modify_writes_nothing() {
        let (_store, history) = history();
        history.append("contact-1", Message::text(MessageAuthor::User, "kept")).unwrap();

        let result: Result<((), Vec<Message>), StorageError> = history.modify("contact-1", |messages| {
            messages.clear();
            Err(StorageError::Poisoned)
        });

        assert!(result.is_err());
        assert_eq!(history.load("contact-1").len(), 1);
    }

    #[test]
    fn test_corrupt_history_reads_empty() {
        let (store, history) = history();
        store.set(&keys::chat_history("asha", "contact-1"), "[{\"broken\"").unwrap();
        assert!(history.load("contact-1").is_empty());
    }
}

// src/credentials.rs
//! Remembered login
//!
//! There are no passwords: logging in means picking a display name, which
//! is stored as a plain string under `chat-username` until logout.

use log::info;

use crate::storage::{keys, KeyValueStore, StorageError};

/// Trimmed username, `None` when blank
pub fn normalize_username(input: &str) -> Option<String> {
    let name = input.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn remembered_username(store: &dyn KeyValueStore) -> Option<String> {
    match store.get(keys::USERNAME) {
        Ok(Some(raw)) => normalize_username(&raw),
        Ok(None) => None,
        Err(e) => {
            log::warn!("Could not read remembered username: {}", e);
            None
        }
    }
}

pub fn remember_username(store: &dyn KeyValueStore, username: &str) -> Result<(), StorageError> {
    store.set(keys::USERNAME, username)?;
    info!("Remembered username {}", username);
    Ok(())
}

pub fn forget_username(store: &dyn KeyValueStore) -> Result<(), StorageError> {
    store.remove(keys::USERNAME)
}

// src/chat/events.rs
//! Temporary event chats
//!
//! An event chat is a contact that lives for 24 hours. The list is stored
//! under `eventChats_<username>` and swept on a fixed interval; entries
//! without an expiry in the future are dropped.

use std::time::Duration;

use chrono::{Local, TimeZone, Utc};
use log::info;

use crate::models::Contact;
use crate::storage::{keys, read_json_or_default, write_json, KeyValueStore, StorageError};

pub const EVENT_LIFETIME_MS: i64 = 24 * 60 * 60 * 1000;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const EVENT_CREATED: &str = "Event created!";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Clock time shown next to a preview, e.g. `10:42 AM`
pub fn display_time(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(time) => time.format("%I:%M %p").to_string(),
        None => String::new(),
    }
}

pub fn new_event_chat(name: &str, now_ms: i64) -> Contact {
    let name = name.trim();
    Contact {
        id: format!("event-{}", now_ms),
        name: name.to_string(),
        avatar: format!("https://picsum.photos/seed/{}/200", name),
        last_message: EVENT_CREATED.to_string(),
        last_message_time: display_time(now_ms),
        unread_count: 0,
        status: None,
        is_event: true,
        expiry: Some(now_ms + EVENT_LIFETIME_MS),
    }
}

pub fn is_active(event: &Contact, now_ms: i64) -> bool {
    matches!(event.expiry, Some(expiry) if expiry > now_ms)
}

pub fn load_events(store: &dyn KeyValueStore, username: &str) -> Vec<Contact> {
    read_json_or_default(store, &keys::event_chats(username))
}

pub fn save_events(store: &dyn KeyValueStore, username: &str, events: &[Contact]) -> Result<(), StorageError> {
    write_json(store, &keys::event_chats(username), events)
}

/// Drop expired entries, rewriting the stored list only when something
/// expired. Returns the active list.
pub fn sweep_events(store: &dyn KeyValueStore, username: &str, now_ms: i64) -> Result<Vec<Contact>, StorageError> {
    let events = load_events(store, username);
    let before = events.len();
    let active: Vec<Contact> = events.into_iter().filter(|e| is_active(e, now_ms)).collect();

    if active.len() != before {
        info!("Removed {} expired event chats", before - active.len());
        save_events(store, username, &active)?;
    }
    Ok(active)
}

/// `<h>h <m>m left`, `<m>m left` or `Expired`
pub fn format_time_left(expiry_ms: i64, now_ms: i64) -> String {
    let diff = expiry_ms - now_ms;
    if diff <= 0 {
        return "Expired".to_string();
    }
    let hours = diff / (60 * 60 * 1000);
    let minutes = (diff % (60 * 60 * 1000)) / (60 * 1000);
    if hours > 0 {
        format!("{}h {}m left", hours, minutes)
    } else {
        format!("{}m left", minutes)
    }
}

// src/chat/status.rs
//! The user's own status image

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::UserStatus;
use crate::storage::{keys, read_json, write_json, KeyValueStore, StorageError};

/// How long a status stays on screen before the viewer closes
pub const STATUS_VIEW_DURATION: Duration = Duration::from_secs(5);

pub fn load_status(store: &dyn KeyValueStore, username: &str) -> Option<UserStatus> {
    read_json(store, &keys::user_status(username))
}

pub fn save_status(store: &dyn KeyValueStore, username: &str, image: &str) -> Result<UserStatus, StorageError> {
    let status = UserStatus {
        image: image.trim().to_string(),
        timestamp: Utc::now(),
    };
    write_json(store, &keys::user_status(username), &status)?;
    Ok(status)
}

/// Relative age of a status, e.g. `Just now`, `5 minutes ago`, `2 hours ago`
pub fn posted_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();

    if minutes < 1 {
        "Just now".to_string()
    } else if hours < 1 {
        format!("{} minute{} ago", minutes, if minutes == 1 { "" } else { "s" })
    } else if hours < 24 {
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

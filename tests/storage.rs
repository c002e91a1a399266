// File-backed persistence tests

mod common;
use common::{setup_logging, ScriptedBackend};

use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use aurachat::chat::{ChatSession, ThemeMode, ThemeSettings};
use aurachat::models::MessageAuthor;
use aurachat::storage::{keys, ChatHistory, FileStore, KeyValueStore};

fn open_store(dir: &std::path::Path) -> Result<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(FileStore::open(dir.join("data"))?))
}

#[test]
fn test_values_survive_reopening() -> Result<()> {
    setup_logging();
    let dir = tempdir()?;

    {
        let store = open_store(dir.path())?;
        let session = ChatSession::new("asha", store, Arc::new(ScriptedBackend::new()));
        session.create_poll("contact-1", "Tea or coffee?", &["Tea".to_string(), "Coffee".to_string()])?;
        session.set_user_status("https://example.com/me.png")?;
        let mut theme = ThemeSettings::default();
        assert!(theme.set_custom_color("#ff8800"));
        theme.mode = ThemeMode::Light;
        session.save_theme(&theme)?;
    }

    let store = open_store(dir.path())?;
    let session = ChatSession::new("asha", store, Arc::new(ScriptedBackend::new()));
    assert_eq!(session.history("contact-1").len(), 1);
    assert_eq!(
        session.user_status().map(|s| s.image),
        Some("https://example.com/me.png".to_string())
    );
    let theme = session.theme();
    assert_eq!(theme.mode, ThemeMode::Light);
    assert_eq!(theme.primary_color(), "#FF8800");
    Ok(())
}

#[test]
fn test_missing_and_corrupt_values_read_as_defaults() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path())?;

    store.set(&keys::chat_history("asha", "contact-2"), "{not json")?;
    store.set(&keys::user_status("asha"), "[]")?;
    store.set(keys::THEME, "\"dark\"")?;

    let session = ChatSession::new("asha", store.clone(), Arc::new(ScriptedBackend::new()));
    assert!(session.history("contact-2").is_empty());
    assert!(session.history("contact-9").is_empty());
    assert!(session.user_status().is_none());
    assert_eq!(session.theme(), ThemeSettings::default());

    // A corrupt history is replaced on the next write
    let history = ChatHistory::new(store, "asha");
    let messages = history.append("contact-2", aurachat::Message::text(MessageAuthor::User, "fresh start"))?;
    assert_eq!(messages.len(), 1);
    assert_eq!(history.load("contact-2").len(), 1);
    Ok(())
}

#[test]
fn test_histories_are_scoped_by_user_and_contact() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path())?;
    let asha = ChatHistory::new(store.clone(), "asha");
    let ravi = ChatHistory::new(store.clone(), "ravi");

    asha.append("contact-1", aurachat::Message::text(MessageAuthor::User, "hi from asha"))?;
    ravi.append("contact-1", aurachat::Message::text(MessageAuthor::User, "hi from ravi"))?;
    asha.append("contact-2", aurachat::Message::text(MessageAuthor::User, "other chat"))?;

    assert_eq!(asha.load("contact-1")[0].content(), "hi from asha");
    assert_eq!(ravi.load("contact-1")[0].content(), "hi from ravi");
    assert_eq!(asha.load("contact-2").len(), 1);
    assert!(ravi.load("contact-2").is_empty());

    store.remove(&keys::chat_history("asha", "contact-1"))?;
    assert!(asha.load("contact-1").is_empty());
    // Removing a missing key is fine
    store.remove(&keys::chat_history("asha", "contact-1"))?;
    Ok(())
}

#[test]
fn test_similar_usernames_keep_separate_histories() -> Result<()> {
    setup_logging();
    let dir = tempdir()?;
    let store = open_store(dir.path())?;

    let names = ["José", "Jos_", "रोहन", "अमित"];
    for name in names {
        let history = ChatHistory::new(store.clone(), name);
        history.append("contact-1", aurachat::Message::text(MessageAuthor::User, format!("hi from {}", name)))?;
    }

    // Reopen so every read comes from disk
    let store = open_store(dir.path())?;
    for name in names {
        let messages = ChatHistory::new(store.clone(), name).load("contact-1");
        assert_eq!(messages.len(), 1, "history for {}", name);
        assert_eq!(messages[0].content(), format!("hi from {}", name));
    }
    Ok(())
}

// src/chat/contacts.rs
//! Built-in contacts and list previews

use chrono::{Duration, Local, Utc};

use crate::models::{Contact, Message, UserStatus};

struct Seed {
    name: &'static str,
    last_message: &'static str,
    last_message_time: &'static str,
    unread_count: u32,
    /// Age of the contact's status in minutes, if they posted one
    status_age_mins: Option<i64>,
}

const SEEDS: [Seed; 10] = [
    Seed { name: "Priya", last_message: "Sounds good! I'll be there.", last_message_time: "10:42 AM", unread_count: 2, status_age_mins: Some(120) },
    Seed { name: "Rohan", last_message: "Just sent over the document.", last_message_time: "9:15 AM", unread_count: 0, status_age_mins: None },
    Seed { name: "Anjali", last_message: "Can you review this presentation?", last_message_time: "Yesterday", unread_count: 0, status_age_mins: Some(300) },
    Seed { name: "Vikram", last_message: "Happy Birthday! 🎉", last_message_time: "Yesterday", unread_count: 1, status_age_mins: None },
    Seed { name: "Aarav", last_message: "I'm running a bit late, see you in 10.", last_message_time: "8:55 AM", unread_count: 0, status_age_mins: Some(0) },
    Seed { name: "Diya", last_message: "Let's catch up this weekend!", last_message_time: "Yesterday", unread_count: 3, status_age_mins: None },
    Seed { name: "Kabir", last_message: "Check out this cool article.", last_message_time: "2 days ago", unread_count: 0, status_age_mins: None },
    Seed { name: "Mira", last_message: "Thanks for your help with the project!", last_message_time: "Yesterday", unread_count: 0, status_age_mins: Some(480) },
    Seed { name: "Siddharth", last_message: "Did you watch the game last night?", last_message_time: "7:12 AM", unread_count: 5, status_age_mins: None },
    Seed { name: "Zara", last_message: "What's the plan for dinner?", last_message_time: "10:05 AM", unread_count: 0, status_age_mins: None },
];

/// The ten contacts every user starts with
pub fn predefined_contacts() -> Vec<Contact> {
    let now = Utc::now();
    SEEDS
        .iter()
        .enumerate()
        .map(|(i, seed)| {
            let slug = seed.name.to_lowercase();
            Contact {
                id: format!("contact-{}", i + 1),
                name: seed.name.to_string(),
                avatar: format!("https://picsum.photos/seed/{}/200", slug),
                last_message: seed.last_message.to_string(),
                last_message_time: seed.last_message_time.to_string(),
                unread_count: seed.unread_count,
                status: seed.status_age_mins.map(|mins| UserStatus {
                    image: format!("https://picsum.photos/seed/{}_status/400/800", slug),
                    timestamp: now - Duration::minutes(mins),
                }),
                is_event: false,
                expiry: None,
            }
        })
        .collect()
}

/// Show the latest stored message as the contact's preview
pub fn refresh_preview(contact: &mut Contact, history: &[Message]) {
    if let Some(last) = history.last() {
        contact.last_message = last.content();
        contact.last_message_time = last.timestamp.with_timezone(&Local).format("%I:%M %p").to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageAuthor;

    #[test]
    fn test_predefined_contacts() {
        let contacts = predefined_contacts();
        assert_eq!(contacts.len(), 10);
        assert_eq!(contacts[0].id, "contact-1");
        assert_eq!(contacts[0].name, "Priya");
        assert_eq!(contacts[9].id, "contact-10");
        assert_eq!(contacts[9].name, "Zara");

        let with_status: Vec<&str> = contacts
            .iter()
            .filter(|c| c.status.is_some())
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(with_status, vec!["Priya", "Anjali", "Aarav", "Mira"]);
        assert!(contacts.iter().all(|c| !c.is_event && c.expiry.is_none()));
    }

    #[test]
    fn test_refresh_preview() {
        let mut contact = predefined_contacts().remove(1);
        refresh_preview(&mut contact, &[]);
        assert_eq!(contact.last_message, "Just sent over the document.");

        let history = vec![
            Message::text(MessageAuthor::User, "hi"),
            Message::text(MessageAuthor::Contact, "hey, what's up?"),
        ];
        refresh_preview(&mut contact, &history);
        assert_eq!(contact.last_message, "hey, what's up?");
        assert!(contact.last_message_time.ends_with('M'));
    }
}

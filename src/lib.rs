// Re-export needed modules for testing
pub mod chat;
pub mod config;
pub mod credentials;
pub mod gemini;
pub mod models;
pub mod storage;

// Re-export main types for convenience
pub use chat::{ChatError, ChatSession};
pub use config::Config;
pub use gemini::{CompletionBackend, GeminiClient, MagicReply, ReplyService};
pub use models::*;
pub use storage::{FileStore, KeyValueStore, MemoryStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let message = Message::text(MessageAuthor::User, "Hello, world!");

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"text\""));
        assert!(json.contains("\"author\":\"user\""));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_message_content_for_each_type() {
        let payment = Message::new(
            MessageAuthor::User,
            MessageBody::Payment(PaymentDetails {
                amount: "250".to_string(),
                note: "dinner".to_string(),
                status: PaymentStatus::Completed,
                transaction_id: "T1".to_string(),
            }),
        );
        assert_eq!(payment.content(), "Payment of ₹250 sent.");

        let voice = Message::new(
            MessageAuthor::Contact,
            MessageBody::Voice {
                data_url: "data:audio/ogg;base64,".to_string(),
                duration_secs: 7,
            },
        );
        assert_eq!(voice.content(), "🎤 Voice note (7s)");

        let document = Message::new(
            MessageAuthor::User,
            MessageBody::Document {
                file_name: "report.pdf".to_string(),
            },
        );
        assert_eq!(document.content(), "report.pdf");
    }

    #[test]
    fn test_contact_wire_format() {
        let json = r#"{
            "id": "event-1",
            "name": "Offsite",
            "avatar": "",
            "lastMessage": "Event created!",
            "lastMessageTime": "09:00 AM",
            "unreadCount": 0,
            "isEvent": true,
            "expiry": 1700000000000
        }"#;
        let contact: Contact = serde_json::from_str(json).unwrap();
        assert!(contact.is_event);
        assert_eq!(contact.expiry, Some(1_700_000_000_000));
        assert!(contact.status.is_none());
    }
}

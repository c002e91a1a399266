use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message. Also identifies a poll voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAuthor {
    User,
    Contact,
}

impl MessageAuthor {
    /// Role name the completion API expects for turns written by this author
    pub fn role(&self) -> &'static str {
        match self {
            MessageAuthor::User => "user",
            MessageAuthor::Contact => "model",
        }
    }
}

/// A single posted status image ("story")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub image: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub last_message: String,
    pub last_message_time: String,
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub is_event: bool,
    /// Epoch milliseconds after which an event chat is removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub amount: String,
    pub note: String,
    pub status: PaymentStatus,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDetails {
    pub question: String,
    pub options: Vec<PollOption>,
    /// Everyone who has already voted on this poll
    pub voters: Vec<MessageAuthor>,
}

/// Message payload, one variant per message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    Document {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    Voice {
        #[serde(rename = "dataUrl")]
        data_url: String,
        #[serde(rename = "durationSecs")]
        duration_secs: u32,
    },
    Payment(PaymentDetails),
    Poll(PollDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: MessageAuthor,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(author: MessageAuthor, body: MessageBody) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            author,
            body,
            timestamp: Utc::now(),
        }
    }

    pub fn text(author: MessageAuthor, text: impl Into<String>) -> Self {
        Self::new(author, MessageBody::Text { text: text.into() })
    }

    /// Human readable content of the message, used for previews,
    /// summaries and when replaying history to the model
    pub fn content(&self) -> String {
        match &self.body {
            MessageBody::Text { text } => text.clone(),
            MessageBody::Image { .. } => "📷 Photo".to_string(),
            MessageBody::Document { file_name } => file_name.clone(),
            MessageBody::Voice { duration_secs, .. } => format!("🎤 Voice note ({}s)", duration_secs),
            MessageBody::Payment(payment) => format!("Payment of ₹{} sent.", payment.amount),
            MessageBody::Poll(poll) => format!("Poll: {}", poll.question),
        }
    }

    pub fn poll(&self) -> Option<&PollDetails> {
        match &self.body {
            MessageBody::Poll(poll) => Some(poll),
            _ => None,
        }
    }

    pub fn poll_mut(&mut self) -> Option<&mut PollDetails> {
        match &mut self.body {
            MessageBody::Poll(poll) => Some(poll),
            _ => None,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.author == MessageAuthor::User
    }
}

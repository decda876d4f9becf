use serde::{Deserialize, Serialize};

use super::{ConversationId, Timestamp};

/// A chat message as listed by `GET /messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier for the message.
    pub id: String,

    /// Group (or direct message) the message was posted in.
    #[serde(default)]
    pub group_id: Option<ConversationId>,

    /// Author of the message.
    pub user_id: String,

    /// The message text.
    pub content: String,

    /// When the backend stored the message.
    pub created_at: Timestamp,

    /// Whether the assistant wrote the message.
    #[serde(default)]
    pub is_ai: bool,

    /// Side thread the message belongs to, if any.
    #[serde(default)]
    pub thread_id: Option<ConversationId>,

    #[serde(default)]
    pub is_pinned: bool,

    #[serde(default)]
    pub reply_to_id: Option<String>,

    #[serde(default)]
    pub file_url: Option<String>,

    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub file_type: Option<String>,

    #[serde(default)]
    pub file_size: Option<u64>,
}

impl Message {
    /// Whether the message has a file attachment.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.file_url.is_some()
    }

    /// Whether `user_id` authored the message.
    #[must_use]
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

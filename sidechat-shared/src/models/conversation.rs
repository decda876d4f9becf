use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Timestamp, user::User};

/// Identifier of a group, direct message or side thread.
///
/// Groups and threads share one key space; the backend issues ids such as
/// `group-1` or UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Wraps a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which listing filter a conversation id maps to on the messages endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// A group or direct message, listed with `group_id`.
    Group,
    /// A side thread, listed with `thread_id`.
    Thread,
}

impl ConversationKind {
    /// Query parameter name used by the messages endpoint.
    #[must_use]
    pub const fn query_param(self) -> &'static str {
        match self {
            Self::Group => "group_id",
            Self::Thread => "thread_id",
        }
    }
}

/// Group flavour as stored by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    #[default]
    Group,
    Dm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: ConversationId,
    pub name: String,
    pub created_at: Timestamp,
    pub owner_id: String,
    #[serde(rename = "type", default)]
    pub group_type: GroupType,
    #[serde(default)]
    pub members: Vec<User>,
}

/// A private side thread spun up inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ConversationId,
    pub group_id: ConversationId,
    pub name: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

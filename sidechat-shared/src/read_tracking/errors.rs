//! # Read Tracking Error Types

use std::path::PathBuf;
use thiserror::Error;

use crate::models::ConversationId;

/// Result type alias for watermark storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the durable key-value store backing the watermarks.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored document could not be decoded.
    #[error("Corrupt data under {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of a [`super::MessageSource`] listing one conversation.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The backend rejected the listing.
    #[error("HTTP {status} while listing messages for {conversation}")]
    Status {
        conversation: ConversationId,
        status: u16,
    },

    /// The request could not be completed or its body decoded.
    #[error("Failed to list messages for {conversation}: {source}")]
    Transport {
        conversation: ConversationId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The source does not know how to list this conversation.
    #[error("Unknown conversation {0}")]
    UnknownConversation(ConversationId),
}

impl FetchError {
    pub fn transport<E>(conversation: &ConversationId, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Transport {
            conversation: conversation.clone(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_io_error_mentions_path() {
        let err = StorageError::io(
            "/tmp/state.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/state.json"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_fetch_error_messages() {
        let conversation = ConversationId::from("group-1");
        assert_eq!(
            FetchError::Status {
                conversation: conversation.clone(),
                status: 503
            }
            .to_string(),
            "HTTP 503 while listing messages for group-1"
        );
        assert_eq!(
            FetchError::UnknownConversation(conversation).to_string(),
            "Unknown conversation group-1"
        );
    }
}

//! # Stream Error Types

use thiserror::Error;

/// Result type alias for stream consumption.
pub type StreamResult<T> = Result<T, StreamError>;

/// Failures that end a streamed AI answer before the server resolved it.
///
/// Protocol errors (an `error` event) and malformed frames are not represented
/// here: the first is delivered through [`super::StreamHandler::on_error`] and
/// the second is skipped.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The server answered successfully but sent no body to read.
    #[error("HTTP {status}: empty response body")]
    EmptyBody { status: u16 },

    /// Reading the next chunk from the connection failed.
    #[error("stream transport failed: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StreamError {
    /// Wraps a read failure from the underlying byte stream.
    pub fn transport<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Transport {
            source: source.into(),
        }
    }

    /// Builds the error for a rejected request.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Whether the connection broke mid-stream, as opposed to being refused.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

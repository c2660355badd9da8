//! Error types for the streaming core.
//!
//! Every error is scoped to a single exchange: a failed exchange never
//! corrupts the conversation entries of other exchanges, and partial content
//! already published stays with the failed exchange for user visibility.
//! The core performs no retries; retry is a caller decision over a fresh
//! send.

use std::fmt;
use std::time::Duration;

use crate::decode::DecodeError;
use crate::traits::HttpError;

/// Errors produced while running an exchange.
#[derive(Debug, Clone)]
pub enum StreamError {
    /// The byte stream could not be decoded as UTF-8.
    Decode(DecodeError),

    /// A collaborator JSON payload was malformed (e.g. the session-creation
    /// response).
    Payload { message: String },

    /// A send was attempted without an established session token.
    NoSession,

    /// A send was attempted while another exchange was still streaming for
    /// the same session.
    ConcurrentSend,

    /// The transport produced no response body at all.
    EmptyBody,

    /// The exchange was invalidated by a newer send, a new session, or an
    /// explicit cancel.
    Cancelled,

    /// No data arrived within the configured chunk timeout.
    Timeout { limit: Duration },

    /// Network or connection failure while opening or reading the stream.
    Transport { message: String },

    /// The server answered with a non-success status.
    Server { status: u16, message: String },
}

impl StreamError {
    /// Whether the exchange ended because it was invalidated rather than
    /// because something went wrong on the wire.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// A message suitable for direct display to the user.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::Decode(_) => {
                "The response could not be decoded. Please try again.".to_string()
            }
            StreamError::Payload { .. } => {
                "Received invalid data from the server. Please try again.".to_string()
            }
            StreamError::NoSession => {
                "No active chat session. Start a new session first.".to_string()
            }
            StreamError::ConcurrentSend => {
                "A reply is still streaming. Wait for it to finish.".to_string()
            }
            StreamError::EmptyBody => "The server returned no content.".to_string(),
            StreamError::Cancelled => "The request was cancelled.".to_string(),
            StreamError::Timeout { .. } => {
                "The server stopped responding. Please try again.".to_string()
            }
            StreamError::Transport { .. } => {
                "Connection to the server was lost. Please try again.".to_string()
            }
            StreamError::Server { status, .. } => {
                format!("The server reported an error ({}).", status)
            }
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Decode(e) => write!(f, "decode error: {}", e),
            StreamError::Payload { message } => write!(f, "invalid payload: {}", message),
            StreamError::NoSession => write!(f, "no active session"),
            StreamError::ConcurrentSend => {
                write!(f, "another exchange is already streaming for this session")
            }
            StreamError::EmptyBody => write!(f, "response had no body"),
            StreamError::Cancelled => write!(f, "exchange cancelled"),
            StreamError::Timeout { limit } => {
                write!(f, "no data received within {:?}", limit)
            }
            StreamError::Transport { message } => write!(f, "transport error: {}", message),
            StreamError::Server { status, message } => {
                write!(f, "server error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for StreamError {
    fn from(e: DecodeError) -> Self {
        StreamError::Decode(e)
    }
}

impl From<HttpError> for StreamError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::ServerError { status, message } => {
                StreamError::Server { status, message }
            }
            other => StreamError::Transport {
                message: other.to_string(),
            },
        }
    }
}

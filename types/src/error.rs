//! Failure taxonomy for calls against the voting API.

use thiserror::Error;

/// Message the server attaches to a `400` when a vote was already recorded.
pub const ALREADY_VOTED_MESSAGE: &str = "User has already voted";

/// Outcome of a failed API call, already classified for the state machines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// No token was available; nothing was sent.
    #[error("You are not signed in.")]
    MissingToken,
    /// The server rejected the token (expired, revoked, or forbidden).
    #[error("Your session has expired. Please sign in again. (HTTP {status})")]
    Unauthorized { status: u16 },
    /// Distinguished business-rule rejection: a vote already exists.
    #[error("You have already voted in this event.")]
    AlreadyVoted,
    #[error("Request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success HTTP status and its extracted error message.
    #[must_use]
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            400 if is_already_voted_message(message) => Self::AlreadyVoted,
            _ => Self::Http {
                status,
                message: message.trim().to_string(),
            },
        }
    }

    /// Auth-missing or auth-rejected: the credential must be dropped.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::MissingToken | Self::Unauthorized { .. })
    }

    /// Whether the user may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Network(_) | Self::Decode(_)
        )
    }
}

fn is_already_voted_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.trim() == ALREADY_VOTED_MESSAGE.to_ascii_lowercase() || lower.contains("already voted")
}

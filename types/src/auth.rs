//! Authentication material.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bearer token issued by the voting server.
///
/// Note: `Debug` is manually implemented to redact the token value, preventing
/// accidental credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthToken(String);

#[derive(Debug, Error)]
#[error("auth token must not be empty")]
pub struct EmptyTokenError;

impl AuthToken {
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyTokenError);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Raw token for the `Authorization` header. Never log the result.
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken(<redacted>)")
    }
}

impl TryFrom<String> for AuthToken {
    type Error = EmptyTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AuthToken> for String {
    fn from(value: AuthToken) -> Self {
        value.0
    }
}

/// Cached profile of the signed-in user.
///
/// The server owns the shape; the client only displays a couple of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CachedUser(serde_json::Value);

impl CachedUser {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Best-effort display name: `name`, then `username`, then `email`.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["name", "username", "email"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(serde_json::Value::as_str))
            .filter(|name| !name.trim().is_empty())
    }
}

/// A persisted sign-in: the token plus the user object returned with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "accessToken")]
    pub token: AuthToken,
    #[serde(default)]
    pub user: Option<CachedUser>,
}

//! Redaction of credentials in free-form text.
//!
//! Server error bodies and transport errors can echo the request's
//! `Authorization` header or a freshly issued token. Everything that flows
//! into logs or user-visible messages passes through [`redact_tokens`] first.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

struct Patterns {
    bearer: Regex,
    jwt: Regex,
    token_field: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let build = || -> Result<Patterns, regex::Error> {
                Ok(Patterns {
                    bearer: Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*")?,
                    jwt: Regex::new(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*")?,
                    token_field: Regex::new(r#"(?i)"(access_?token|token)"\s*:\s*"[^"]*""#)?,
                })
            };
            match build() {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    tracing::error!("Token redaction patterns failed to compile: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// Replace bearer headers, JWTs and JSON `token` fields with `[REDACTED]`.
///
/// If the patterns could not be built the whole text is withheld rather than
/// returned unscrubbed.
#[must_use]
pub fn redact_tokens(text: &str) -> Cow<'_, str> {
    let Some(p) = patterns() else {
        return Cow::Borrowed(REDACTED);
    };

    let mut out = Cow::Borrowed(text);
    if p.bearer.is_match(&out) {
        out = Cow::Owned(p.bearer.replace_all(&out, "Bearer [REDACTED]").into_owned());
    }
    if p.jwt.is_match(&out) {
        out = Cow::Owned(p.jwt.replace_all(&out, REDACTED).into_owned());
    }
    if p.token_field.is_match(&out) {
        out = Cow::Owned(
            p.token_field
                .replace_all(&out, "\"$1\":\"[REDACTED]\"")
                .into_owned(),
        );
    }
    out
}

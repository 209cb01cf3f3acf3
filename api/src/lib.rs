//! HTTP client for the voting API.
//!
//! # Architecture
//!
//! [`VoteClient`] wraps one hardened `reqwest::Client` bound to a base URL.
//! Every call goes through [`retry::send_with_retry`] and its outcome is
//! classified into an [`ApiError`] before it leaves this crate:
//!
//! | Endpoint | Method | Retry policy |
//! |----------|--------|--------------|
//! | `/auth/login` | [`VoteClient::sign_in`] | connect errors only |
//! | `/auth/register` | [`VoteClient::register`] | connect errors only |
//! | `/event/{id}` | [`VoteClient::get_event`] | statuses + transport |
//! | `/event/{id}/vote` | [`VoteClient::cast_vote`] | connect errors only |
//! | `/event/{id}/stats` | [`VoteClient::get_results`] | statuses + transport |
//!
//! # Error bodies
//!
//! Error bodies are read up to 32 KiB, the message is pulled from the JSON
//! (`/message`, `/error/message`, `/error`) when present, bearer tokens are
//! scrubbed and the result is truncated for display.

pub mod retry;

use std::time::Duration;

use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use evote_utils::redact_tokens;

pub use evote_types;
pub use evote_types::{ApiError, AuthToken, Credential, EventDetail, EventId, EventResults};
pub use retry::{Idempotency, RetryConfig};

use evote_types::{VoteRequest, truncate_with_ellipsis};
use retry::RetryOutcome;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid API base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported API base URL {0:?}: expected an http(s) URL with a path")]
    UnsupportedBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

fn base_client_builder(https_only: bool) -> reqwest::ClientBuilder {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert("Accept", HeaderValue::from_static("application/json"));
    default_headers.insert(
        "X-Client",
        HeaderValue::from_static(concat!("evote/", env!("CARGO_PKG_VERSION"))),
    );

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(https_only)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of an error response.
pub async fn read_capped_error_body(response: Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Pull a human-readable message out of a JSON error body.
#[must_use]
pub fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body.trim()).ok()?;
    payload
        .pointer("/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| payload.pointer("/error").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

/// Scrub and shorten server-provided text before it is logged or shown.
fn sanitize_message(raw: &str) -> String {
    truncate_with_ellipsis(&redact_tokens(raw), MAX_ERROR_MESSAGE_CHARS)
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Client for the voting API.
#[derive(Debug, Clone)]
pub struct VoteClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
}

impl VoteClient {
    /// Build a client for `base_url`.
    ///
    /// `https_only` is enforced unless the base URL itself is plain `http`,
    /// which only makes sense against a local development server.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, ClientBuildError> {
        let base_url =
            Url::parse(base_url.trim()).map_err(|source| ClientBuildError::InvalidBaseUrl {
                url: base_url.to_string(),
                source,
            })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientBuildError::UnsupportedBaseUrl(base_url.to_string()));
        }
        let https_only = base_url.scheme() == "https";
        if !https_only {
            tracing::warn!(base_url = %base_url, "API base URL is not HTTPS");
        }
        let http = base_client_builder(https_only).timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Validated in `new`: the base URL always has a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `POST /auth/login`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let url = self.endpoint(&["auth", "login"]);
        let body = SignInRequest { email, password };
        let outcome = retry::send_with_retry(
            || self.http.post(url.clone()).json(&body),
            Idempotency::Unsafe,
            &self.retry,
        )
        .await;
        decode_json(outcome, "sign-in").await
    }

    /// `POST /auth/register`. The server signs the new account in.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Credential, ApiError> {
        let url = self.endpoint(&["auth", "register"]);
        let body = RegisterRequest {
            name,
            email,
            password,
        };
        let outcome = retry::send_with_retry(
            || self.http.post(url.clone()).json(&body),
            Idempotency::Unsafe,
            &self.retry,
        )
        .await;
        decode_json(outcome, "register").await
    }

    /// `GET /event/{id}`.
    pub async fn get_event(
        &self,
        token: &AuthToken,
        event_id: &EventId,
    ) -> Result<EventDetail, ApiError> {
        let url = self.endpoint(&["event", event_id.as_str()]);
        let outcome = retry::send_with_retry(
            || self.http.get(url.clone()).bearer_auth(token.expose_secret()),
            Idempotency::Safe,
            &self.retry,
        )
        .await;
        decode_json(outcome, "get-event").await
    }

    /// `POST /event/{id}/vote` with `{"optionName": ...}`.
    ///
    /// Sent once; only a failed connection is retried.
    pub async fn cast_vote(
        &self,
        token: &AuthToken,
        event_id: &EventId,
        option_name: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["event", event_id.as_str(), "vote"]);
        let body = VoteRequest {
            option_name: option_name.to_string(),
        };
        let outcome = retry::send_with_retry(
            || {
                self.http
                    .post(url.clone())
                    .bearer_auth(token.expose_secret())
                    .json(&body)
            },
            Idempotency::Unsafe,
            &self.retry,
        )
        .await;
        let response = into_success(outcome, "cast-vote").await?;
        tracing::info!(event_id = %event_id, status = %response.status(), "Vote accepted");
        Ok(())
    }

    /// `GET /event/{id}/stats`.
    pub async fn get_results(
        &self,
        token: &AuthToken,
        event_id: &EventId,
    ) -> Result<EventResults, ApiError> {
        let url = self.endpoint(&["event", event_id.as_str(), "stats"]);
        let outcome = retry::send_with_retry(
            || self.http.get(url.clone()).bearer_auth(token.expose_secret()),
            Idempotency::Safe,
            &self.retry,
        )
        .await;
        decode_json(outcome, "get-results").await
    }
}

async fn into_success(outcome: RetryOutcome, op: &'static str) -> Result<Response, ApiError> {
    match outcome {
        RetryOutcome::Success(response) => Ok(response),
        RetryOutcome::HttpError(response) => {
            let status = response.status().as_u16();
            let body = read_capped_error_body(response).await;
            let message = extract_error_message(&body).unwrap_or(body);
            let message = sanitize_message(&message);
            let error = ApiError::from_status(status, &message);
            tracing::warn!(op, status, error = %error, "API request failed");
            Err(error)
        }
        RetryOutcome::Transport { attempts, source } => {
            let detail = sanitize_message(&source.to_string());
            tracing::warn!(op, attempts, "API request failed: {detail}");
            Err(ApiError::Network(if attempts > 1 {
                format!("{detail} (after {attempts} attempts)")
            } else {
                detail
            }))
        }
    }
}

async fn decode_json<T: DeserializeOwned>(
    outcome: RetryOutcome,
    op: &'static str,
) -> Result<T, ApiError> {
    let response = into_success(outcome, op).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Network(sanitize_message(&e.to_string())))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(op, "Undecodable API response: {e}");
        ApiError::Decode(e.to_string())
    })
}

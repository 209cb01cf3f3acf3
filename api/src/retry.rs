//! HTTP retry policy with exponential backoff.
//!
//! - Max retries: 2 (3 total attempts) unless configured otherwise
//! - Initial delay: 250ms, max delay: 4s
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//!
//! Reads ([`Idempotency::Safe`]) retry on 408, 429, 5xx and transport
//! errors. Writes ([`Idempotency::Unsafe`], i.e. vote submission) never retry
//! on an HTTP status and only retry when the connection could not be
//! established, so the request provably never reached the server. Every
//! attempt carries the same `Idempotency-Key`.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial request).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Whether repeating a request can change server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Safe,
    Unsafe,
}

/// Parse `Retry-After` (whole seconds). Accepted only in `(0, 60s)`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let delay = Duration::from_secs(secs);
    (delay > Duration::ZERO && delay < Duration::from_secs(60)).then_some(delay)
}

#[must_use]
pub fn should_retry_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500..=599)
}

/// Exponential backoff with down-jitter.
///
/// `backoff_step` is 0 before the first retry. A valid `Retry-After` wins.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

#[must_use]
pub fn generate_idempotency_key() -> String {
    format!("evote-{}", Uuid::new_v4())
}

/// Outcome of a retried request.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response after retries (if any) were exhausted.
    HttpError(Response),
    /// Transport failure; `attempts` counts every request sent.
    Transport { attempts: u32, source: reqwest::Error },
}

fn is_retryable_error(error: &reqwest::Error, idempotency: Idempotency) -> bool {
    match idempotency {
        Idempotency::Safe => error.is_connect() || error.is_timeout() || error.is_request(),
        Idempotency::Unsafe => error.is_connect(),
    }
}

/// Send a request, retrying per `config` and `idempotency`.
///
/// `build_request` is called once per attempt.
pub async fn send_with_retry<F>(
    build_request: F,
    idempotency: Idempotency,
    config: &RetryConfig,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = generate_idempotency_key();
    let mut attempt: u32 = 0;

    loop {
        let retries_left = attempt < config.max_retries;
        let request = build_request()
            .header("Idempotency-Key", &idempotency_key)
            .header("X-Retry-Count", attempt.to_string());

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success(response);
                }
                if retries_left
                    && idempotency == Idempotency::Safe
                    && should_retry_status(status)
                {
                    let delay = calculate_retry_delay(attempt, config, Some(response.headers()));
                    tracing::debug!(
                        status = %status,
                        retry_count = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after error status"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return RetryOutcome::HttpError(response);
            }
            Err(e) => {
                if retries_left && is_retryable_error(&e, idempotency) {
                    let delay = calculate_retry_delay(attempt, config, None);
                    tracing::debug!(
                        error = %e,
                        retry_count = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after connection error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return RetryOutcome::Transport {
                    attempts: attempt + 1,
                    source: e,
                };
            }
        }
    }
}

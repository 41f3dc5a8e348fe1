//! Resilient HTTP transport with retry, backoff and jitter.
//!
//! Every upstream call goes through [`resilient_request`]. Retries happen on
//! 429, 503, 504 and on network or timeout errors; other client errors are
//! surfaced immediately. The backoff is exponential with a cap and ±20%
//! jitter, and a `Retry-After` header (seconds) overrides the computed delay.

use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};

use crate::models::SourceId;
use crate::sources::SourceError;

/// Configuration for one resilient request.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap on the computed backoff delay.
    pub max_delay: Duration,
    /// Timeout applied to each attempt independently.
    pub attempt_timeout: Duration,
    /// The service being called, for logging and error attribution.
    pub service: SourceId,
}

impl RequestOptions {
    pub fn for_service(service: SourceId) -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(15),
            service,
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Add ±20% jitter to a delay to avoid thundering-herd retries.
fn add_jitter(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(-0.2f64..=0.2f64);
    delay.mul_f64(1.0 + jitter)
}

/// Computed backoff for a given zero-based attempt index.
fn backoff_delay(opts: &RequestOptions, attempt: u32) -> Duration {
    let exp = opts
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    add_jitter(exp.min(opts.max_delay))
}

/// Parse a `Retry-After` header value as whole seconds.
fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// Issue an HTTP request with retry, per-attempt timeout and backoff.
///
/// `build` is called once per attempt, so callers can vary the request
/// between attempts (the PubMed adapter rotates API keys this way).
pub async fn resilient_request<F>(
    opts: &RequestOptions,
    build: F,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = SourceError::Network("no attempt made".to_string());

    for attempt in 0..=opts.max_retries {
        let error = match timeout(opts.attempt_timeout, build().send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                match status.as_u16() {
                    429 => SourceError::RateLimited {
                        retry_after: retry_after_seconds(&response),
                    },
                    503 | 504 => SourceError::Network(format!("HTTP {}", status.as_u16())),
                    s if status.is_client_error() => {
                        return Err(SourceError::Client { status: s });
                    }
                    s => {
                        return Err(SourceError::Api(format!(
                            "{} returned unexpected status {}",
                            opts.service.name(),
                            s
                        )));
                    }
                }
            }
            Ok(Err(e)) => SourceError::Network(e.to_string()),
            Err(_) => SourceError::Timeout {
                service: opts.service,
            },
        };

        if attempt < opts.max_retries {
            let delay = match &error {
                SourceError::RateLimited {
                    retry_after: Some(seconds),
                } => Duration::from_secs(*seconds),
                _ => backoff_delay(opts, attempt),
            };
            tracing::warn!(
                service = opts.service.id(),
                attempt = attempt + 1,
                max_retries = opts.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            last_error = error;
            sleep(delay).await;
        } else {
            last_error = error;
        }
    }

    tracing::error!(
        service = opts.service.id(),
        retries = opts.max_retries,
        error = %last_error,
        "request failed after exhausting retries"
    );
    Err(SourceError::Exhausted {
        service: opts.service,
        cause: Box::new(last_error),
    })
}

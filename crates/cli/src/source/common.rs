//! Request pacing and the retry loop shared by source adapters.
//!
//! - `Pacer` keeps a minimum interval between consecutive requests
//! - `FetchClient` wraps the blocking HTTP client with the 429 retry policy
//!   and maps every other failure to a typed [`SourceError`]

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::SourceError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const USER_AGENT: &str = concat!("sheetsync/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for a single back-off sleep, `Retry-After` included.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ── Pacer ───────────────────────────────────────────────────────────

/// Enforces a minimum interval between the starts of consecutive requests.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Time still to wait at `now`. Zero before the first request.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the interval has passed, then mark a request as started.
    pub fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        self.last = Some(Instant::now());
    }
}

// ── Retry policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(super) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): doubles each time,
    /// capped at [`MAX_BACKOFF`]. A server-sent `Retry-After` wins.
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            self.initial_backoff
                .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
                .unwrap_or(MAX_BACKOFF)
        });
        delay.min(MAX_BACKOFF)
    }
}

// ── FetchClient ─────────────────────────────────────────────────────

pub(super) struct FetchClient {
    http: reqwest::blocking::Client,
    pacer: Pacer,
    policy: RetryPolicy,
}

impl FetchClient {
    pub(super) fn new(pacing: Duration, policy: RetryPolicy) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Network(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            pacer: Pacer::new(pacing),
            policy,
        })
    }

    /// Send a request, retrying on 429 only, and decode a JSON body.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured request (URL, auth header, query).
    pub(super) fn get_json(
        &mut self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, SourceError> {
        let mut retry = 0u32;

        loop {
            self.pacer.wait();
            let response = build_request(&self.http)
                .send()
                .map_err(|e| SourceError::Network(e.to_string()))?;
            let status = response.status().as_u16();

            if response.status().is_success() {
                return response
                    .json()
                    .map_err(|e| SourceError::Parse(e.to_string()));
            }

            if status == 429 {
                if retry >= self.policy.max_retries {
                    return Err(SourceError::RateLimited { attempts: retry + 1 });
                }
                let wait = self.policy.delay(retry, retry_after(&response));
                warn!(
                    retry = retry + 1,
                    max_retries = self.policy.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited, backing off"
                );
                thread::sleep(wait);
                retry += 1;
                continue;
            }

            let body = response.text().unwrap_or_default();
            debug!(status, body = %body, "CRM request failed");
            if status == 401 || status == 403 {
                return Err(SourceError::Auth { status, body });
            }
            return Err(SourceError::Upstream { status, body });
        }
    }
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
fn retry_after(response: &reqwest::blocking::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_first_request_is_immediate() {
        let pacer = Pacer::new(Duration::from_millis(340));
        assert_eq!(pacer.remaining(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_pacer_remaining_after_request() {
        let mut pacer = Pacer::new(Duration::from_secs(10));
        pacer.wait();
        let remaining = pacer.remaining(Instant::now());
        assert!(remaining > Duration::from_secs(9), "{:?}", remaining);

        let later = Instant::now() + Duration::from_secs(11);
        assert_eq!(pacer.remaining(later), Duration::ZERO);
    }

    #[test]
    fn test_pacer_spaces_requests() {
        let mut pacer = Pacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(0, None), Duration::from_secs(1));
        assert_eq!(policy.delay(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay(10, None), MAX_BACKOFF);
        assert_eq!(policy.delay(40, None), MAX_BACKOFF);
    }

    #[test]
    fn test_retry_after_wins_but_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(3, Some(Duration::from_secs(2))), Duration::from_secs(2));
        assert_eq!(policy.delay(0, Some(Duration::from_secs(3600))), MAX_BACKOFF);
    }
}

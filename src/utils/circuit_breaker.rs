//! Circuit breaker guarding each external service.
//!
//! Three states:
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: too many consecutive failures, requests fast-fail
//! - **Half-open**: the reset window elapsed, a single probe is allowed
//!
//! One breaker exists per external service for the lifetime of the process,
//! shared by every concurrent search. State transitions are guarded by a
//! mutex; the original cooperative-scheduler version could get away without
//! one, a threaded runtime cannot. All transitions take an explicit `now`
//! instant so tests can drive the clock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::SourceId;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    last_failure_at: Option<Instant>,
}

/// Per-service failure tracker.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: SourceId,
    failure_threshold: usize,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with explicit thresholds.
    pub fn new(service: SourceId, failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            service,
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Default thresholds: 5 consecutive failures, 30s reset window.
    pub fn default_for(service: SourceId) -> Self {
        Self::new(service, 5, Duration::from_secs(30))
    }

    pub fn service(&self) -> SourceId {
        self.service
    }

    /// Whether a request may proceed. While open, returns false until the
    /// reset window has elapsed, then transitions to half-open and allows
    /// the single probe.
    pub fn can_request(&self) -> bool {
        self.can_request_at(Instant::now())
    }

    pub fn can_request_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::warn!(
                        service = self.service.id(),
                        "circuit half-open, allowing test request"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request. A half-open success closes the circuit.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.state == CircuitState::HalfOpen {
            tracing::warn!(service = self.service.id(), "circuit closed, service recovered");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
    }

    /// Record a failed request.
    pub fn on_failure(&self) {
        self.on_failure_at(Instant::now());
    }

    pub fn on_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(now);

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            tracing::warn!(service = self.service.id(), "circuit re-opened, test request failed");
            return;
        }

        if inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    service = self.service.id(),
                    failures = inner.consecutive_failures,
                    "circuit opened after consecutive failures"
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    /// Current state, for monitoring.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_by_default() {
        let breaker = CircuitBreaker::default_for(SourceId::Pubmed);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_request());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let now = Instant::now();
        let breaker = CircuitBreaker::new(SourceId::Pubmed, 5, Duration::from_secs(30));

        for _ in 0..4 {
            breaker.on_failure_at(now);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_request_at(now));

        breaker.on_failure_at(now);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_request_at(now));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let now = Instant::now();
        let breaker = CircuitBreaker::new(SourceId::Openalex, 3, Duration::from_secs(30));

        breaker.on_failure_at(now);
        breaker.on_failure_at(now);
        breaker.on_success();
        breaker.on_failure_at(now);
        breaker.on_failure_at(now);
        // only 2 consecutive failures since the success
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_window() {
        let now = Instant::now();
        let breaker = CircuitBreaker::new(SourceId::SemanticScholar, 2, Duration::from_secs(30));

        breaker.on_failure_at(now);
        breaker.on_failure_at(now);
        assert!(!breaker.can_request_at(now));
        assert!(!breaker.can_request_at(now + Duration::from_secs(29)));

        // reset window elapsed: exactly one probe allowed
        assert!(breaker.can_request_at(now + Duration::from_secs(30)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes() {
        let now = Instant::now();
        let breaker = CircuitBreaker::new(SourceId::ClinicalTrials, 2, Duration::from_secs(30));

        breaker.on_failure_at(now);
        breaker.on_failure_at(now);
        assert!(breaker.can_request_at(now + Duration::from_secs(31)));
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_request_at(now + Duration::from_secs(31)));
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let now = Instant::now();
        let breaker = CircuitBreaker::new(SourceId::ClinicalTrials, 2, Duration::from_secs(30));

        breaker.on_failure_at(now);
        breaker.on_failure_at(now);
        let probe_time = now + Duration::from_secs(31);
        assert!(breaker.can_request_at(probe_time));
        breaker.on_failure_at(probe_time);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_request_at(probe_time + Duration::from_secs(1)));
        // a fresh reset window opens another probe
        assert!(breaker.can_request_at(probe_time + Duration::from_secs(30)));
    }
}

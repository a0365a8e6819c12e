//! # Circuit Breaker Module
//!
//! Stops calling the macro oracle for a while after it has failed
//! repeatedly, so a Gemini outage turns into an immediate "try again later"
//! instead of every user waiting out the full retry ladder.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for oracle requests
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold reached, requests fail fast
/// - **Half-Open**: Reset timeout elapsed, the next request is let through
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    ///
    /// ```rust
    /// use macromate::circuit_breaker::CircuitBreaker;
    /// use macromate::config::RecoveryConfig;
    ///
    /// let breaker = CircuitBreaker::new(&RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold.max(1),
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    /// Whether requests should currently be rejected
    ///
    /// Moves to half-open once the reset timeout has elapsed.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count < self.threshold {
            return false;
        }
        match state.last_failure {
            Some(last) if last.elapsed() < self.reset_after => true,
            _ => {
                info!("Oracle circuit breaker half-open, allowing a trial request");
                *state = BreakerState::default();
                false
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());
        if state.failure_count == self.threshold {
            warn!(
                failures = state.failure_count,
                reset_secs = self.reset_after.as_secs(),
                "Oracle circuit breaker opened"
            );
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }
}

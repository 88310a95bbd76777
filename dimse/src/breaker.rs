//! Per-server circuit breakers.
//!
//! A breaker starts closed, opens after a number of consecutive
//! transient failures, and allows one probe attempt after a reset
//! timeout; the probe outcome decides whether the breaker closes
//! again or reopens.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The observable states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Attempts pass through; failures are counted.
    Closed,
    /// Attempts are refused without touching the network.
    Open,
    /// One probe attempt is allowed through.
    HalfOpen,
}

/// Configuration of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A circuit breaker guarding one server.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// The current state of the breaker.
    ///
    /// An open breaker whose reset timeout has elapsed
    /// reports itself as half-open.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether an attempt may pass through right now.
    ///
    /// In the half-open state this consumes the probe slot:
    /// concurrent callers are refused until the probe outcome
    /// is recorded.
    pub fn acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                // hold further attempts back until this probe resolves
                inner.opened_at = Some(Instant::now());
                inner.state = BreakerState::Open;
                true
            }
        }
    }

    /// Record a successful attempt, closing the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            debug!("circuit breaker closing after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a transient failure,
    /// opening the breaker once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold {
            if inner.state == BreakerState::Closed {
                warn!(
                    "circuit breaker opening after {} consecutive failures",
                    inner.consecutive_failures
                );
            }
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
    }
}

/// A table of circuit breakers keyed by server address,
/// sharing one configuration.
#[derive(Debug, Clone)]
pub struct BreakerTable {
    config: CircuitBreakerConfig,
    breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerTable {
    /// Create an empty table.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        BreakerTable {
            config,
            breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the breaker for the given server,
    /// creating a closed one on first use.
    pub fn breaker_for(&self, server: &str) -> Arc<CircuitBreaker> {
        let mut map = self.breakers.lock();
        map.entry(server.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
        }
    }

    #[test]
    fn opens_after_threshold() {
        let breaker = CircuitBreaker::new(config(5, 30_000));
        for _ in 0..4 {
            assert!(breaker.acquire());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.acquire());
        breaker.record_failure();
        // the sixth attempt is refused without a socket call
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.acquire());
    }

    #[test]
    fn probe_after_reset_timeout() {
        let breaker = CircuitBreaker::new(config(1, 10));
        breaker.record_failure();
        assert!(!breaker.acquire());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // the probe is allowed through once
        assert!(breaker.acquire());
        assert!(!breaker.acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.acquire());
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(config(1, 10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.acquire());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 30_000));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}

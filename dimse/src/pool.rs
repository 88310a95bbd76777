//! Server pooling: selection strategies, failover dispatch,
//! and the glue between retry policy and circuit breakers.

use crate::breaker::{BreakerState, BreakerTable, CircuitBreakerConfig};
use crate::retry::RetryPolicy;
use parking_lot::Mutex;
use rand::Rng;
use snafu::{Backtrace, Snafu};
use std::time::Duration;
use tracing::{debug, warn};

/// One remote DICOM node in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// The socket address of the node (`host:port`).
    pub address: String,
    /// The called AE title of the node.
    pub ae_title: String,
    /// The weight used by the weighted selection strategies.
    pub weight: u32,
    /// The priority used by the priority strategy; higher wins.
    pub priority: u32,
    /// Disabled servers are never selected.
    pub enabled: bool,
}

impl ServerEntry {
    /// Create an enabled entry with weight 1 and priority 0.
    pub fn new(address: impl Into<String>, ae_title: impl Into<String>) -> Self {
        ServerEntry {
            address: address.into(),
            ae_title: ae_title.into(),
            weight: 1,
            priority: 0,
            enabled: true,
        }
    }
}

/// The strategy used to pick a server from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Cycle through the enabled servers.
    #[default]
    RoundRobin,
    /// Always pick the enabled server with the highest priority.
    Priority,
    /// Smooth weighted round robin.
    WeightedRoundRobin,
    /// Pick an enabled server uniformly at random.
    Random,
    /// Pick an enabled server at random, biased by weight.
    RandomWeighted,
    /// Always pick the first enabled server (failover order).
    Failover,
}

#[derive(Debug)]
struct PoolState {
    round_robin_index: usize,
    current_weights: Vec<i64>,
}

/// A pool of remote servers with a selection strategy.
///
/// The pool is internally synchronized:
/// selection may be called from any number of threads.
#[derive(Debug)]
pub struct ServerPool {
    entries: Vec<ServerEntry>,
    strategy: SelectionStrategy,
    state: Mutex<PoolState>,
}

impl ServerPool {
    /// Create a pool over the given servers.
    pub fn new(entries: Vec<ServerEntry>, strategy: SelectionStrategy) -> Self {
        let weights = entries.iter().map(|_| 0i64).collect();
        ServerPool {
            entries,
            strategy,
            state: Mutex::new(PoolState {
                round_robin_index: 0,
                current_weights: weights,
            }),
        }
    }

    /// The servers in this pool.
    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }

    /// Select the next server according to the pool strategy,
    /// skipping servers which the given filter refuses
    /// (such as those behind an open circuit breaker).
    pub fn select_with(&self, mut permitted: impl FnMut(&ServerEntry) -> bool) -> Option<&ServerEntry> {
        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled && permitted(e))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let index = match self.strategy {
            SelectionStrategy::RoundRobin => {
                let mut state = self.state.lock();
                let index = candidates[state.round_robin_index % candidates.len()];
                state.round_robin_index = state.round_robin_index.wrapping_add(1);
                index
            }
            SelectionStrategy::Priority => *candidates
                .iter()
                .max_by_key(|&&i| self.entries[i].priority)?,
            SelectionStrategy::WeightedRoundRobin => {
                // smooth weighted round robin: each candidate accumulates
                // its weight, the largest accumulator wins and is then
                // reduced by the weight total
                let mut state = self.state.lock();
                let total: i64 = candidates
                    .iter()
                    .map(|&i| i64::from(self.entries[i].weight))
                    .sum();
                for &i in &candidates {
                    state.current_weights[i] += i64::from(self.entries[i].weight);
                }
                let &best = candidates
                    .iter()
                    .max_by_key(|&&i| state.current_weights[i])?;
                state.current_weights[best] -= total;
                best
            }
            SelectionStrategy::Random => {
                let mut rng = rand::thread_rng();
                candidates[rng.gen_range(0..candidates.len())]
            }
            SelectionStrategy::RandomWeighted => {
                let mut rng = rand::thread_rng();
                let total: u64 = candidates
                    .iter()
                    .map(|&i| u64::from(self.entries[i].weight))
                    .sum();
                if total == 0 {
                    candidates[rng.gen_range(0..candidates.len())]
                } else {
                    let mut ticket = rng.gen_range(0..total);
                    let mut chosen = candidates[0];
                    for &i in &candidates {
                        let w = u64::from(self.entries[i].weight);
                        if ticket < w {
                            chosen = i;
                            break;
                        }
                        ticket -= w;
                    }
                    chosen
                }
            }
            SelectionStrategy::Failover => candidates[0],
        };
        self.entries.get(index)
    }

    /// Select the next server according to the pool strategy.
    pub fn select(&self) -> Option<&ServerEntry> {
        self.select_with(|_| true)
    }
}

/// The errors produced by a pooled dispatch.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DispatchError {
    #[snafu(display("no server available for dispatch"))]
    NoServerAvailable { backtrace: Backtrace },

    #[snafu(display(
        "operation failed after {} attempts, last error: {}",
        attempts,
        message
    ))]
    AttemptsExhausted {
        attempts: u32,
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("operation failed: {}", message))]
    Fatal { message: String, backtrace: Backtrace },
}

/// The error type an operation reports to the dispatcher.
///
/// Only transient errors (connect refused, timeouts, resets)
/// count against retry and the circuit breaker;
/// anything else aborts the dispatch at once.
#[derive(Debug)]
pub struct OperationError {
    /// Whether the error is transient and worth retrying.
    pub transient: bool,
    /// A description of the error.
    pub message: String,
}

impl OperationError {
    /// A transient error eligible for retry.
    pub fn transient(message: impl Into<String>) -> Self {
        OperationError {
            transient: true,
            message: message.into(),
        }
    }

    /// A permanent error, not eligible for retry.
    pub fn fatal(message: impl Into<String>) -> Self {
        OperationError {
            transient: false,
            message: message.into(),
        }
    }

    /// Classify an I/O error: connection and timeout problems
    /// are transient, everything else is not.
    pub fn from_io(e: &std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let transient = matches!(
            e.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | TimedOut
                | WouldBlock
                | BrokenPipe
                | NotConnected
        );
        OperationError {
            transient,
            message: e.to_string(),
        }
    }
}

/// The outcome of a successful pooled dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome<T> {
    /// The value produced by the operation.
    pub value: T,
    /// How many retries were needed (zero when the first attempt
    /// succeeded).
    pub retry_attempts: u32,
    /// The address of the server which served the operation.
    pub server: String,
}

/// Combines the server pool, the retry policy
/// and the per-server circuit breakers into one dispatch path.
#[derive(Debug)]
pub struct Dispatcher {
    pool: ServerPool,
    retry: RetryPolicy,
    breakers: BreakerTable,
    /// sleep hook, replaceable in tests
    sleep: fn(Duration),
}

impl Dispatcher {
    /// Create a dispatcher over the given pool.
    pub fn new(pool: ServerPool, retry: RetryPolicy, breaker_config: CircuitBreakerConfig) -> Self {
        Dispatcher {
            pool,
            retry,
            breakers: BreakerTable::new(breaker_config),
            sleep: std::thread::sleep,
        }
    }

    /// Replace the backoff sleep function (used by tests).
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// The circuit breaker table of this dispatcher.
    pub fn breakers(&self) -> &BreakerTable {
        &self.breakers
    }

    /// Run the operation against servers chosen from the pool,
    /// retrying transient failures with exponential backoff.
    pub fn execute<T>(
        &self,
        mut operation: impl FnMut(&ServerEntry) -> Result<T, OperationError>,
    ) -> Result<DispatchOutcome<T>, DispatchError> {
        let mut last_message = String::new();
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                (self.sleep)(self.retry.delay(attempt - 1));
            }

            let server = match self.pool.select_with(|entry| {
                self.breakers.breaker_for(&entry.address).state() != BreakerState::Open
            }) {
                Some(server) => server,
                None => {
                    // every candidate is disabled or circuit-broken
                    if attempt == 0 {
                        return NoServerAvailableSnafu.fail();
                    }
                    last_message = "no server available".to_string();
                    continue;
                }
            };
            let breaker = self.breakers.breaker_for(&server.address);
            if !breaker.acquire() {
                // lost the probe slot to a concurrent dispatch
                last_message = format!("circuit breaker open for {}", server.address);
                continue;
            }

            debug!("dispatch attempt {} to {}", attempt, server.address);
            match operation(server) {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(DispatchOutcome {
                        value,
                        retry_attempts: attempt,
                        server: server.address.clone(),
                    });
                }
                Err(e) if e.transient => {
                    warn!("transient failure from {}: {}", server.address, e.message);
                    breaker.record_failure();
                    last_message = e.message;
                }
                Err(e) => {
                    return FatalSnafu { message: e.message }.fail();
                }
            }
        }
        AttemptsExhaustedSnafu {
            attempts: self.retry.max_attempts,
            message: last_message,
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool_of(n: usize, strategy: SelectionStrategy) -> ServerPool {
        let entries = (0..n)
            .map(|i| ServerEntry {
                address: format!("10.0.0.{}:104", i + 1),
                ae_title: format!("PACS{}", i + 1),
                weight: (i as u32) + 1,
                priority: (i as u32) * 10,
                enabled: true,
            })
            .collect();
        ServerPool::new(entries, strategy)
    }

    #[test]
    fn round_robin_cycles() {
        let pool = pool_of(3, SelectionStrategy::RoundRobin);
        let picks: Vec<String> = (0..6)
            .map(|_| pool.select().unwrap().address.clone())
            .collect();
        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_ne!(picks[0], picks[1]);
    }

    #[test]
    fn priority_picks_the_highest() {
        let pool = pool_of(3, SelectionStrategy::Priority);
        assert_eq!(pool.select().unwrap().address, "10.0.0.3:104");
    }

    #[test]
    fn failover_sticks_to_the_first_enabled() {
        let mut entries = vec![
            ServerEntry::new("primary:104", "P1"),
            ServerEntry::new("backup:104", "P2"),
        ];
        entries[0].enabled = false;
        let pool = ServerPool::new(entries, SelectionStrategy::Failover);
        assert_eq!(pool.select().unwrap().address, "backup:104");
    }

    #[test]
    fn smooth_weighted_round_robin_distribution() {
        // weights 1, 2, 3 over 6 picks must yield 1, 2 and 3 picks
        let pool = pool_of(3, SelectionStrategy::WeightedRoundRobin);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..6 {
            *counts
                .entry(pool.select().unwrap().address.clone())
                .or_default() += 1;
        }
        assert_eq!(counts["10.0.0.1:104"], 1);
        assert_eq!(counts["10.0.0.2:104"], 2);
        assert_eq!(counts["10.0.0.3:104"], 3);
    }

    #[test]
    fn dispatch_retries_transient_failures() {
        let pool = ServerPool::new(
            vec![ServerEntry::new("10.0.0.1:104", "PACS")],
            SelectionStrategy::Failover,
        );
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(10),
        };
        let dispatcher =
            Dispatcher::new(pool, retry, CircuitBreakerConfig::default()).with_sleep(|_| {});

        let mut failures_left = 1;
        let outcome = dispatcher
            .execute(|_server| {
                if failures_left > 0 {
                    failures_left -= 1;
                    Err(OperationError::transient("connection refused"))
                } else {
                    Ok(0x0000u16)
                }
            })
            .unwrap();
        assert_eq!(outcome.retry_attempts, 1);
        assert_eq!(outcome.value, 0x0000);
        // one failure is below the threshold: the breaker stays closed
        assert_eq!(
            dispatcher
                .breakers()
                .breaker_for("10.0.0.1:104")
                .state(),
            crate::breaker::BreakerState::Closed
        );
    }

    #[test]
    fn dispatch_does_not_retry_fatal_errors() {
        let pool = ServerPool::new(
            vec![ServerEntry::new("10.0.0.1:104", "PACS")],
            SelectionStrategy::Failover,
        );
        let dispatcher = Dispatcher::new(
            pool,
            RetryPolicy::default(),
            CircuitBreakerConfig::default(),
        )
        .with_sleep(|_| {});

        let mut calls = 0;
        let result: Result<DispatchOutcome<()>, _> = dispatcher.execute(|_server| {
            calls += 1;
            Err(OperationError::fatal("bad request"))
        });
        assert!(matches!(result, Err(DispatchError::Fatal { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn breaker_refuses_after_threshold_within_dispatch() {
        let pool = ServerPool::new(
            vec![ServerEntry::new("10.0.0.1:104", "PACS")],
            SelectionStrategy::Failover,
        );
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(1),
        };
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        };
        let dispatcher = Dispatcher::new(pool, retry, breaker_config).with_sleep(|_| {});

        let mut socket_calls = 0;
        let result: Result<DispatchOutcome<()>, _> = dispatcher.execute(|_server| {
            socket_calls += 1;
            Err(OperationError::transient("timed out"))
        });
        assert!(result.is_err());
        // after five failures the breaker opens:
        // the remaining attempts never reach the operation
        assert_eq!(socket_calls, 5);
        assert_eq!(
            dispatcher
                .breakers()
                .breaker_for("10.0.0.1:104")
                .state(),
            crate::breaker::BreakerState::Open
        );
    }
}

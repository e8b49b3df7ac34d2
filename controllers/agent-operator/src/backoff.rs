//! # Fibonacci Backoff
//!
//! Progressive requeue delays for failed reconcile passes. The sequence grows
//! more slowly than exponential backoff: min, min, 2·min, 3·min, 5·min, ... capped at max.
//!
//! Two sequences run per resource key: a short one for transient API errors
//! (conflicts, throttling) and a long one for errors that need a user change.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Unit of the sequence (for reset)
    min: Duration,
    /// Previous backoff value
    prev: Duration,
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Backoff state for one resource
#[derive(Debug, Clone)]
struct BackoffState {
    transient: FibonacciBackoff,
    permanent: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            transient: FibonacciBackoff::new(Duration::from_secs(5), Duration::from_secs(60)),
            permanent: FibonacciBackoff::new(Duration::from_secs(60), Duration::from_secs(600)),
            error_count: 0,
        }
    }
}

/// Per-key backoff tracking (key: `kind/namespace/name`)
#[derive(Debug, Default)]
pub struct BackoffRegistry {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffRegistry {
    /// Record a failure and return how long to wait before retrying
    pub fn on_error(&self, key: &str, transient: bool) -> (Duration, u32) {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
        state.error_count += 1;
        let delay = if transient {
            state.transient.next_backoff()
        } else {
            state.permanent.next_backoff()
        };
        (delay, state.error_count)
    }

    /// Forget the failures of a key after a successful pass
    pub fn on_success(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states.remove(key);
    }
}

//! Per-agent failure accounting and state machine.
//!
//! Transitions are a pure function of the ordered event stream plus a
//! monotonic clock, which makes the breaker property-testable (P4): replaying
//! the same `(event, now)` sequence always yields the same trajectory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    pub failure_count: f32,
    pub opened_at: Option<Instant>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0.0,
            opened_at: None,
        }
    }
}

/// Outcome events the breaker consumes. `Tick` lets the orchestrator advance
/// the cooldown clock without an associated agent outcome.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
    Tick,
}

fn failure_weight(kind: ErrorKind) -> f32 {
    match kind {
        ErrorKind::Transient => 0.5,
        ErrorKind::Recoverable | ErrorKind::Critical => 1.0,
        ErrorKind::Cancelled | ErrorKind::Timeout => 1.0,
    }
}

impl CircuitBreakerState {
    /// Applies one event, given a `threshold` and `cooldown`, and a clock
    /// reading `now`. Returns the new state (identical to `self.state` if the
    /// transition is a no-op).
    pub fn apply(
        &mut self,
        event: Outcome,
        now: Instant,
        threshold: f32,
        cooldown: std::time::Duration,
    ) -> BreakerState {
        match event {
            Outcome::Success => match self.state {
                BreakerState::HalfOpen => {
                    self.state = BreakerState::Closed;
                    self.failure_count = 0.0;
                }
                BreakerState::Closed => {
                    self.failure_count = (self.failure_count - 0.1).max(0.0);
                }
                BreakerState::Open => {}
            },
            Outcome::Failure(kind) => {
                self.failure_count += failure_weight(kind);
                if self.state == BreakerState::Closed && self.failure_count >= threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                } else if self.state == BreakerState::HalfOpen {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                }
            }
            Outcome::Tick => {
                if self.state == BreakerState::Open {
                    if let Some(opened_at) = self.opened_at {
                        if now.duration_since(opened_at) >= cooldown {
                            self.state = BreakerState::HalfOpen;
                        }
                    }
                }
            }
        }
        self.state
    }
}

/// Thread-safe registry of per-agent breaker state, shared across the
/// orchestration loop.
#[derive(Clone, Default)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreakerState>>>,
    threshold: f32,
    cooldown: std::time::Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: f32, cooldown_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            threshold,
            cooldown: std::time::Duration::from_millis(cooldown_ms),
        }
    }

    pub fn is_open(&self, agent: &str) -> bool {
        self.inner
            .lock()
            .expect("circuit breaker mutex poisoned")
            .get(agent)
            .map(|s| s.state == BreakerState::Open)
            .unwrap_or(false)
    }

    pub fn record(&self, agent: &str, event: Outcome, now: Instant) -> BreakerState {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        let entry = guard.entry(agent.to_string()).or_default();
        entry.apply(event, now, self.threshold, self.cooldown)
    }

    pub fn tick_all(&self, now: Instant) {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        for state in guard.values_mut() {
            state.apply(Outcome::Tick, now, self.threshold, self.cooldown);
        }
    }

    pub fn snapshot(&self, agent: &str) -> CircuitBreakerState {
        self.inner
            .lock()
            .expect("circuit breaker mutex poisoned")
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_to_open_on_threshold() {
        let mut s = CircuitBreakerState::default();
        let now = Instant::now();
        s.apply(Outcome::Failure(ErrorKind::Recoverable), now, 2.0, std::time::Duration::from_secs(1));
        assert_eq!(s.state, BreakerState::Closed);
        s.apply(Outcome::Failure(ErrorKind::Recoverable), now, 2.0, std::time::Duration::from_secs(1));
        assert_eq!(s.state, BreakerState::Open);
    }

    #[test]
    fn open_to_half_open_after_cooldown() {
        let mut s = CircuitBreakerState::default();
        let t0 = Instant::now();
        s.state = BreakerState::Open;
        s.opened_at = Some(t0);
        let cooldown = std::time::Duration::from_millis(10);
        s.apply(Outcome::Tick, t0, 1.0, cooldown);
        assert_eq!(s.state, BreakerState::Open);
        let later = t0 + std::time::Duration::from_millis(20);
        s.apply(Outcome::Tick, later, 1.0, cooldown);
        assert_eq!(s.state, BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let mut s = CircuitBreakerState::default();
        s.state = BreakerState::HalfOpen;
        s.failure_count = 5.0;
        s.apply(Outcome::Success, Instant::now(), 2.0, std::time::Duration::from_secs(1));
        assert_eq!(s.state, BreakerState::Closed);
        assert_eq!(s.failure_count, 0.0);
    }

    #[test]
    fn deterministic_trajectory_for_fixed_event_stream() {
        let events = [
            Outcome::Failure(ErrorKind::Transient),
            Outcome::Failure(ErrorKind::Transient),
            Outcome::Failure(ErrorKind::Recoverable),
            Outcome::Tick,
            Outcome::Success,
        ];
        let now = Instant::now();
        let run = || {
            let mut s = CircuitBreakerState::default();
            let mut trace = Vec::new();
            for e in events {
                trace.push(s.apply(e, now, 2.0, std::time::Duration::from_millis(1)));
            }
            trace
        };
        assert_eq!(run(), run());
    }
}

//! Resilience wrapper — per-category circuit breakers around tool execution.
//!
//! One breaker exists per capability category (`finance`, `weather`, ...),
//! shared by every task in the process. A breaker moves through three
//! states:
//!
//! - **Closed**: calls pass through. Consecutive failures are counted, and
//!   optionally the failure ratio over a rolling window.
//! - **Open**: reached after `failure_threshold` consecutive failures (or
//!   when the windowed failure ratio crosses its threshold). Calls fail
//!   immediately with [`ToolError::CircuitOpen`] without running.
//! - **HalfOpen**: the first call after the cool-down is let through as a
//!   trial, one at a time. Success closes the circuit, failure reopens it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ponder_config::{BreakerConfig, ResilienceConfig};
use ponder_core::error::ToolError;
use ponder_core::event::{DomainEvent, EventBus};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure-ratio trip condition over a rolling window.
#[derive(Debug, Clone, PartialEq)]
pub struct RateWindow {
    /// Ratio in (0, 1] at or above which the circuit opens
    pub threshold: f64,
    pub window: Duration,
    /// Outcomes required in the window before the ratio counts
    pub min_calls: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub failure_rate: Option<RateWindow>,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for BreakerPolicy {
    fn from(cfg: &BreakerConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold.max(1),
            cooldown: Duration::from_secs(cfg.cooldown_secs),
            failure_rate: cfg.failure_rate.map(|threshold| RateWindow {
                threshold,
                window: Duration::from_secs(cfg.window_secs),
                min_calls: cfg.min_calls,
            }),
        }
    }
}

/// A breaker policy bound to the category it protects.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePolicy {
    pub category: String,
    pub breaker: BreakerPolicy,
}

impl ResiliencePolicy {
    pub fn new(category: impl Into<String>, breaker: BreakerPolicy) -> Self {
        Self {
            category: category.into(),
            breaker,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// (when, succeeded) for the failure-rate window
    outcomes: VecDeque<(Instant, bool)>,
}

type Transition = (CircuitState, CircuitState);

/// A circuit breaker for one capability category.
pub struct CircuitBreaker {
    category: String,
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
    events: Option<Arc<EventBus>>,
}

impl CircuitBreaker {
    pub fn new(policy: ResiliencePolicy) -> Self {
        Self {
            category: policy.category,
            policy: policy.breaker,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
                opened_at: None,
                trial_in_flight: false,
                outcomes: VecDeque::new(),
            }),
            events: None,
        }
    }

    /// Publish `CircuitStateChanged` on every transition.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// Run `op` under the breaker.
    ///
    /// In the open state `op` is never called. Every `Err` from `op` counts
    /// as one failure, every `Ok` as one success.
    pub async fn fire<T, F, Fut>(&self, op: F) -> Result<T, ToolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let trial = self.acquire()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };

        let outcome = op().await;
        guard.armed = false;
        self.record(outcome.is_ok(), trial);
        outcome
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.lock();
        CircuitBreakerState {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_time: inner.last_failure_time,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit a call. `Ok(true)` marks the half-open trial.
    fn acquire(&self) -> Result<bool, ToolError> {
        let mut transition = None;
        let admitted = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => Ok(false),
                CircuitState::Open => {
                    let cooled = inner
                        .opened_at
                        .is_none_or(|at| at.elapsed() >= self.policy.cooldown);
                    if cooled {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                        Ok(true)
                    } else {
                        Err(self.open_error())
                    }
                }
                CircuitState::HalfOpen if inner.trial_in_flight => Err(self.open_error()),
                CircuitState::HalfOpen => {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        };
        if let Some(t) = transition {
            self.announce(t);
        }
        if admitted.is_err() {
            debug!(category = %self.category, "Circuit open, rejecting call");
        }
        admitted
    }

    fn record(&self, success: bool, trial: bool) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            if success {
                self.on_success(&mut inner, now, trial)
            } else {
                self.on_failure(&mut inner, now, trial)
            }
        };
        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn on_success(&self, inner: &mut BreakerInner, now: Instant, trial: bool) -> Option<Transition> {
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.outcomes.clear();
            return Some((CircuitState::HalfOpen, CircuitState::Closed));
        }
        if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
            self.push_outcome(inner, now, true);
        }
        None
    }

    fn on_failure(&self, inner: &mut BreakerInner, now: Instant, trial: bool) -> Option<Transition> {
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_time = Some(Utc::now());

        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            return Some((CircuitState::HalfOpen, CircuitState::Open));
        }
        if inner.state != CircuitState::Closed {
            return None;
        }

        self.push_outcome(inner, now, false);
        let by_count = inner.consecutive_failures >= self.policy.failure_threshold;
        let by_rate = self.rate_exceeded(inner);
        if by_count || by_rate {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            return Some((CircuitState::Closed, CircuitState::Open));
        }
        None
    }

    fn push_outcome(&self, inner: &mut BreakerInner, now: Instant, success: bool) {
        let Some(rate) = &self.policy.failure_rate else {
            return;
        };
        inner.outcomes.push_back((now, success));
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.duration_since(at) > rate.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn rate_exceeded(&self, inner: &BreakerInner) -> bool {
        let Some(rate) = &self.policy.failure_rate else {
            return false;
        };
        let calls = inner.outcomes.len();
        if calls == 0 || calls < rate.min_calls as usize {
            return false;
        }
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / calls as f64 >= rate.threshold
    }

    fn open_error(&self) -> ToolError {
        ToolError::CircuitOpen {
            category: self.category.clone(),
        }
    }

    fn announce(&self, (from, to): Transition) {
        match to {
            CircuitState::Open => warn!(
                category = %self.category,
                from = %from,
                threshold = self.policy.failure_threshold,
                "Circuit breaker opened"
            ),
            _ => info!(category = %self.category, from = %from, to = %to, "Circuit breaker transition"),
        }
        if let Some(events) = &self.events {
            events.publish(DomainEvent::CircuitStateChanged {
                category: self.category.clone(),
                from: from.to_string(),
                to: to.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CircuitBreaker")
            .field("category", &self.category)
            .field("state", &snapshot.state)
            .field("consecutive_failures", &snapshot.consecutive_failures)
            .field("failure_threshold", &self.policy.failure_threshold)
            .field("cooldown", &self.policy.cooldown)
            .finish()
    }
}

/// Releases the half-open trial slot if the call is dropped mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

/// Lazily created breakers, one per category.
pub struct BreakerRegistry {
    default_policy: BreakerPolicy,
    policies: HashMap<String, BreakerPolicy>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    events: Option<Arc<EventBus>>,
}

impl BreakerRegistry {
    pub fn new(default_policy: BreakerPolicy) -> Self {
        Self {
            default_policy,
            policies: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        config
            .categories
            .iter()
            .fold(Self::new(BreakerPolicy::from(&config.default)), |registry, (name, cfg)| {
                registry.with_policy(ResiliencePolicy::new(name.clone(), BreakerPolicy::from(cfg)))
            })
    }

    pub fn with_policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policies.insert(policy.category, policy.breaker);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// The effective policy for `category`.
    pub fn policy_for(&self, category: &str) -> &BreakerPolicy {
        self.policies.get(category).unwrap_or(&self.default_policy)
    }

    /// The shared breaker for `category`, created on first use.
    pub fn breaker(&self, category: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .entry(category.to_string())
            .or_insert_with(|| {
                let mut breaker = CircuitBreaker::new(ResiliencePolicy::new(
                    category,
                    self.policy_for(category).clone(),
                ));
                if let Some(events) = &self.events {
                    breaker = breaker.with_events(events.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// State of every breaker created so far, sorted by category.
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerState)> {
        let breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out: Vec<_> = breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}

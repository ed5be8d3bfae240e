//! Circuit breaker guarding [`crate::domain::market::store::CandleStore`]
//! calls. Three states (CLOSED / OPEN / HALF_OPEN); trips on a failure
//! *rate* over a sliding window of recent calls rather than a bare
//! consecutive-failure streak, and admits only a bounded number of trial
//! calls while HALF_OPEN.

use crate::infrastructure::observability::Metrics;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreakerConfig {
    /// Fraction of recent calls (0.0-1.0) that must fail to trip the
    /// breaker, e.g. 0.5 for "50% over a sliding window".
    pub failure_rate_threshold: f64,
    /// Minimum number of calls observed before the failure rate is
    /// considered meaningful; avoids tripping on the very first call.
    pub min_calls: usize,
    /// Size of the sliding window of recent call outcomes.
    pub window_size: usize,
    /// How long the breaker stays OPEN before allowing trial calls.
    pub open_duration: Duration,
    /// Number of trial calls permitted while HALF_OPEN.
    pub half_open_trial_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            min_calls: 5,
            window_size: 20,
            open_duration: Duration::from_secs(30),
            half_open_trial_calls: 3,
        }
    }
}

struct State {
    state: CircuitState,
    window: VecDeque<bool>, // true = success
    opened_at: Option<Instant>,
    half_open_trials_remaining: usize,
    half_open_failed: bool,
}

/// Wraps async calls (store saves/reads) with CLOSED/OPEN/HALF_OPEN
/// protection. CLOSED calls pass straight through; OPEN fails fast with
/// [`CircuitBreakerError::Open`]; HALF_OPEN admits a limited number of
/// trial calls and their outcomes decide the next state.
pub struct CircuitBreaker {
    state: Arc<RwLock<State>>,
    config: CircuitBreakerConfig,
    name: String,
    metrics: Arc<Metrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                half_open_trials_remaining: config.half_open_trial_calls,
                half_open_failed: false,
            })),
            config,
            name: name.into(),
            metrics,
        }
    }

    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.write().await;

            match state.state {
                CircuitState::Open => {
                    let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                    if elapsed >= self.config.open_duration {
                        info!(
                            breaker = %self.name,
                            "transitioning Open -> HalfOpen (timeout elapsed)"
                        );
                        state.state = CircuitState::HalfOpen;
                        state.half_open_trials_remaining = self.config.half_open_trial_calls;
                        state.half_open_failed = false;
                        self.metrics
                            .circuit_breaker_transitions_total
                            .with_label_values(&["half_open"])
                            .inc();
                    } else {
                        return Err(CircuitBreakerError::Open);
                    }
                }
                CircuitState::HalfOpen => {
                    if state.half_open_trials_remaining == 0 {
                        return Err(CircuitBreakerError::Open);
                    }
                    state.half_open_trials_remaining -= 1;
                }
                CircuitState::Closed => {}
            }
        }

        match f.await {
            Ok(result) => {
                self.on_outcome(true).await;
                Ok(result)
            }
            Err(e) => {
                self.on_outcome(false).await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_outcome(&self, success: bool) {
        let mut state = self.state.write().await;

        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);

        match state.state {
            CircuitState::Closed => {
                if state.window.len() >= self.config.min_calls {
                    let failures = state.window.iter().filter(|ok| !**ok).count();
                    let rate = failures as f64 / state.window.len() as f64;
                    if rate >= self.config.failure_rate_threshold {
                        error!(
                            breaker = %self.name,
                            failure_rate = rate,
                            "transitioning Closed -> Open (failure rate threshold breached)"
                        );
                        state.state = CircuitState::Open;
                        state.opened_at = Some(Instant::now());
                        self.metrics
                            .circuit_breaker_transitions_total
                            .with_label_values(&["open"])
                            .inc();
                    }
                }
            }
            CircuitState::HalfOpen => {
                if !success {
                    state.half_open_failed = true;
                }
                if state.half_open_trials_remaining == 0 {
                    if state.half_open_failed {
                        warn!(
                            breaker = %self.name,
                            "transitioning HalfOpen -> Open (trial call failed)"
                        );
                        state.state = CircuitState::Open;
                        state.opened_at = Some(Instant::now());
                        self.metrics
                            .circuit_breaker_transitions_total
                            .with_label_values(&["open"])
                            .inc();
                    } else {
                        info!(breaker = %self.name, "transitioning HalfOpen -> Closed");
                        state.state = CircuitState::Closed;
                        state.window.clear();
                        self.metrics
                            .circuit_breaker_transitions_total
                            .with_label_values(&["closed"])
                            .inc();
                    }
                } else if !success {
                    // Any failure while trials remain reopens immediately —
                    // no point burning the remaining trial budget on a
                    // breaker we already know is unhealthy.
                    warn!(
                        breaker = %self.name,
                        "transitioning HalfOpen -> Open (failure during recovery)"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                    self.metrics
                        .circuit_breaker_transitions_total
                        .with_label_values(&["open"])
                        .inc();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error(transparent)]
    Inner(E),
}

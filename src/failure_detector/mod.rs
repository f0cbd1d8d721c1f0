//! # φ-accrual failure detector
//!
//! Gates endpoint availability from a window of heartbeat
//! inter-arrival samples, following the accrual formula of
//! Hayashibara et al.: `phi(t) = -log10(1 - F(t))` where `F` is the
//! normal CDF of the elapsed time since the last heartbeat, evaluated
//! against the sampled mean and variance of recent inter-arrivals.

mod heartbeat;

pub use heartbeat::{HeartbeatMode, HeartbeatProbe};

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::FailureDetectorConfig;

/// Ring buffer size for inter-arrival samples. Not pinned by the
/// wire/behavioral contract; 1000 is common accrual-detector practice.
const WINDOW_SIZE: usize = 1000;

struct State {
    last_arrival: Option<Instant>,
    intervals: VecDeque<f64>,
    /// When `phi` first crossed `phi_threshold`, so `is_available` can
    /// require it to have stayed above threshold for `failure_interval`.
    suspicious_since: Option<Instant>,
    /// When a sender last reported an explicit I/O failure via
    /// `record_failure`, independent of the heartbeat-driven `phi`
    /// estimate above.
    last_failure: Option<Instant>,
}

impl State {
    fn new() -> Self {
        Self {
            last_arrival: None,
            intervals: VecDeque::with_capacity(WINDOW_SIZE),
            suspicious_since: None,
            last_failure: None,
        }
    }
}

/// Tracks heartbeat arrivals for one endpoint and answers
/// `is_available()` for the sender stack.
pub struct FailureDetector {
    config: FailureDetectorConfig,
    state: Mutex<State>,
}

impl FailureDetector {
    /// Create a detector with no samples yet; `is_available()` returns
    /// `true` until enough history accumulates to judge otherwise.
    pub fn new(config: FailureDetectorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::new()),
        }
    }

    /// Record a heartbeat arrival now.
    pub fn record_arrival(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(last) = state.last_arrival {
            let interval = now.duration_since(last).as_secs_f64();
            if state.intervals.len() == WINDOW_SIZE {
                state.intervals.pop_front();
            }
            state.intervals.push_back(interval);
        }
        state.last_arrival = Some(now);
        state.suspicious_since = None;
        state.last_failure = None;
    }

    /// Record an explicit send failure (spec.md §4.3: "on any I/O
    /// failure ... notify the failure detector"). Marks the endpoint
    /// unavailable for `failure_interval`, independent of whatever the
    /// heartbeat-driven `phi` estimate currently says — a heartbeat
    /// probe can keep connecting fine while actual sends are failing.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.last_failure = Some(Instant::now());
    }

    /// The current suspicion level, or `0.0` if there's no history yet
    /// or no heartbeat has ever arrived.
    pub fn phi(&self) -> f64 {
        self.phi_at(Instant::now())
    }

    fn phi_at(&self, now: Instant) -> f64 {
        let state = self.state.lock();
        let Some(last) = state.last_arrival else {
            return 0.0;
        };
        if state.intervals.is_empty() {
            return 0.0;
        }

        let n = state.intervals.len() as f64;
        let mean = state.intervals.iter().sum::<f64>() / n;
        let variance = state
            .intervals
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt().max(1e-9);

        let elapsed = now.duration_since(last).as_secs_f64();
        let survival = 1.0 - normal_cdf(elapsed, mean, std_dev);
        if survival <= 0.0 {
            return f64::INFINITY;
        }
        -survival.log10()
    }

    /// Whether the endpoint is considered available: `phi` must have
    /// stayed above `phi_threshold` for at least `failure_interval` to
    /// flip this to `false`, and an explicit `record_failure` keeps it
    /// `false` for `failure_interval` regardless of `phi`.
    pub fn is_available(&self) -> bool {
        let now = Instant::now();
        let phi = self.phi_at(now);
        let mut state = self.state.lock();

        let phi_suspicious = if phi > self.config.phi_threshold {
            let since = *state.suspicious_since.get_or_insert(now);
            now.duration_since(since) >= self.config.failure_interval
        } else {
            state.suspicious_since = None;
            false
        };

        let failure_suspicious = state
            .last_failure
            .is_some_and(|at| now.duration_since(at) < self.config.failure_interval);

        !phi_suspicious && !failure_suspicious
    }
}

/// Standard normal CDF via the complementary error function, evaluated
/// for a `Normal(mean, std_dev)` distribution at `x`.
fn normal_cdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    let z = (x - mean) / (std_dev * std::f64::consts::SQRT_2);
    0.5 * (1.0 + erf(z))
}

/// Abramowitz & Stegun 7.1.26 rational approximation of `erf`, accurate
/// to ~1.5e-7 — ample for a suspicion-level heuristic.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

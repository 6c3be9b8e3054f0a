//! Sample history and rolling window averages.
//!
//! Every new reading is appended to the history, the history is pruned by
//! count and by age, and all eight window averages are recomputed from what
//! survives. A window only reports a value once the oldest retained sample is
//! at least as old as the window itself, so a 30 minute average is never
//! built from a few seconds of data.

use crate::config::AggregatorConfig;
use crate::core::clock::{Clock, MonotonicClock};
use crate::core::windows::{Window, WindowAverages};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on the number of retained samples.
pub const MAX_SAMPLES: usize = 100_000;

/// Samples older than this are dropped (30 minutes).
pub const RETENTION: Duration = Duration::from_secs(1800);

/// Rounding applied to window averages.
pub const DECIMAL_PLACES: u32 = 2;

/// A single timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Instant,
    pub value: f64,
}

impl Sample {
    /// Age of this sample relative to `now`, never negative.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

/// Derived values after the most recent `add_value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorState {
    /// Last raw reading, unrounded. Zero when the history is empty.
    pub instant: f64,
    /// Rounded mean per window, `None` while warming up.
    pub windows: WindowAverages,
    /// Samples retained after pruning.
    pub sample_count: usize,
}

/// Aggregator behind the single lock required when shared across threads.
pub type SharedAggregator<C = MonotonicClock> = Arc<Mutex<Aggregator<C>>>;

/// Holds the sample history and the derived window averages.
#[derive(Debug)]
pub struct Aggregator<C = MonotonicClock> {
    clock: C,
    history: VecDeque<Sample>,
    state: AggregatorState,
    max_samples: usize,
    retention: Duration,
    decimal_places: u32,
}

impl Aggregator<MonotonicClock> {
    /// Create an aggregator with default limits on the real clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl Default for Aggregator<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Aggregator<C> {
    /// Create an aggregator with default limits on the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self::with_limits(clock, MAX_SAMPLES, RETENTION, DECIMAL_PLACES)
    }

    /// Create an aggregator from configuration.
    pub fn from_config(config: &AggregatorConfig, clock: C) -> Self {
        Self::with_limits(
            clock,
            config.max_samples,
            config.retention,
            config.decimal_places,
        )
    }

    /// Create an aggregator with explicit limits.
    pub fn with_limits(
        clock: C,
        max_samples: usize,
        retention: Duration,
        decimal_places: u32,
    ) -> Self {
        Self {
            clock,
            history: VecDeque::new(),
            state: AggregatorState::default(),
            max_samples,
            retention,
            decimal_places,
        }
    }

    /// Record a new reading and recompute all windows.
    ///
    /// Any finite value is accepted; range checking belongs to the decoder.
    pub fn add_value(&mut self, value: f64) -> &AggregatorState {
        let now = self.clock.now();
        self.history.push_back(Sample {
            timestamp: now,
            value,
        });
        self.prune(now);
        self.compute_windows(now);
        &self.state
    }

    /// Enforce the count bound, then the age bound.
    fn prune(&mut self, now: Instant) {
        if self.history.len() > self.max_samples {
            let excess = self.history.len() - self.max_samples;
            self.history.drain(..excess);
        }

        // History is chronological, so stale samples are always at the front.
        while let Some(oldest) = self.history.front() {
            if oldest.age(now) <= self.retention {
                break;
            }
            self.history.pop_front();
        }
    }

    fn compute_windows(&mut self, now: Instant) {
        self.state.instant = self.history.back().map_or(0.0, |s| s.value);
        self.state.sample_count = self.history.len();

        let oldest_age = self.history.front().map(|s| s.age(now));
        for window in Window::ALL {
            let span = window.duration();
            let value = match oldest_age {
                Some(age) if age >= span => {
                    let mean = self
                        .history
                        .iter()
                        .filter(|s| s.age(now) <= span)
                        .map(|s| s.value)
                        .mean();
                    Some(round_to(mean, self.decimal_places))
                }
                _ => None,
            };
            self.state.windows.set(window, value);
        }
    }

    /// State computed by the last `add_value`.
    pub fn state(&self) -> &AggregatorState {
        &self.state
    }

    pub fn instant(&self) -> f64 {
        self.state.instant
    }

    pub fn windows(&self) -> &WindowAverages {
        &self.state.windows
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.history.iter()
    }

    /// Wrap this aggregator for use from several threads.
    pub fn into_shared(self) -> SharedAggregator<C> {
        Arc::new(Mutex::new(self))
    }
}

/// Round to `places` decimals, ties to even.
fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round_ties_even() / factor
}

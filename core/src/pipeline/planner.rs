//! Reading-speed observer that sizes the prefetch window.
//!
//! A deliberately coarse hysteresis controller: the window moves one step
//! at a time on sustained fast or slow reading and holds otherwise, so
//! noisy page-turn timings do not make it oscillate.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::PlannerConfig;

/// Tracks recent page-transition durations and derives how many pages
/// ahead to prefetch.
#[derive(Debug)]
pub struct ReadingPlanner {
    samples: VecDeque<Duration>,
    window: u32,
    last_transition: Option<Instant>,
    config: PlannerConfig,
}

impl ReadingPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        let window = config.initial_window.clamp(config.min_window, config.max_window);
        Self {
            samples: VecDeque::with_capacity(config.sample_capacity),
            window,
            last_transition: None,
            config,
        }
    }

    /// Current look-ahead size in pages.
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Record a successful page transition at the current instant.
    pub fn record_transition(&mut self) {
        self.record_transition_at(Instant::now());
    }

    /// Nudge the window up by `steps`, capped at the configured maximum.
    /// Used on connectivity upgrades; nothing ever nudges it down.
    pub fn boost(&mut self, steps: u32) {
        let before = self.window;
        self.window = (self.window + steps).min(self.config.max_window);
        if self.window != before {
            debug!(target: "planner", window = self.window, "window boosted");
        }
    }

    fn record_transition_at(&mut self, now: Instant) {
        if let Some(previous) = self.last_transition.replace(now) {
            self.push_sample(now.saturating_duration_since(previous));
        }
    }

    fn push_sample(&mut self, duration: Duration) {
        if self.samples.len() == self.config.sample_capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.samples.len() < self.config.min_samples {
            return;
        }

        let total: Duration = self.samples.iter().sum();
        let mean = total / self.samples.len() as u32;

        let before = self.window;
        if mean < self.config.fast_threshold {
            self.window = (self.window + 1).min(self.config.max_window);
        } else if mean > self.config.slow_threshold {
            self.window = self.window.saturating_sub(1).max(self.config.min_window);
        }

        if self.window != before {
            debug!(
                target: "planner",
                mean_ms = mean.as_millis() as u64,
                window = self.window,
                "look-ahead adjusted"
            );
        }
    }
}

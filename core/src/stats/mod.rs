//! Runtime counters for the loader pipeline.
//!
//! Lightweight hooks recording fetch and decode latency, cache
//! effectiveness, and prefetch churn. Snapshots feed the embedder's
//! diagnostics surface.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

const DEFAULT_SAMPLE_CAPACITY: usize = 240;

#[derive(Debug, Default)]
struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn percentile(&self, percentile: f32) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let rank = percentile.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
        let index = rank.round() as usize;
        sorted.get(index).copied().unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct StatsInner {
    started_at: Instant,
    fetch_times_ms: SampleWindow,
    decode_times_ms: SampleWindow,
    cache_requests: u64,
    cache_hits: u64,
    cache_entries: usize,
    cache_capacity: usize,
    in_flight: usize,
    prefetch_window: u32,
    prefetch_failures: u64,
    pages_displayed: u64,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            fetch_times_ms: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            decode_times_ms: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            cache_requests: 0,
            cache_hits: 0,
            cache_entries: 0,
            cache_capacity: 0,
            in_flight: 0,
            prefetch_window: 0,
            prefetch_failures: 0,
            pages_displayed: 0,
        }
    }
}

/// Thread-safe counter collection shared across the loader and its
/// background tasks.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: parking_lot::Mutex<StatsInner>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the wall time of one page acquisition (transfer + decode).
    pub fn record_fetch(&self, duration: Duration) {
        let mut guard = self.inner.lock();
        guard.fetch_times_ms.push(duration.as_secs_f64() as f32 * 1_000.0);
    }

    pub fn record_decode(&self, duration: Duration) {
        let mut guard = self.inner.lock();
        guard.decode_times_ms.push(duration.as_secs_f64() as f32 * 1_000.0);
    }

    /// Record whether a cache lookup produced a hit.
    pub fn record_cache_lookup(&self, hit: bool) {
        let mut guard = self.inner.lock();
        guard.cache_requests = guard.cache_requests.saturating_add(1);
        if hit {
            guard.cache_hits = guard.cache_hits.saturating_add(1);
        }
    }

    pub fn record_page_displayed(&self) {
        let mut guard = self.inner.lock();
        guard.pages_displayed = guard.pages_displayed.saturating_add(1);
    }

    pub fn record_prefetch_failure(&self) {
        let mut guard = self.inner.lock();
        guard.prefetch_failures = guard.prefetch_failures.saturating_add(1);
    }

    /// Update the aggregate cache and scheduler gauges.
    pub fn update_pipeline(&self, entries: usize, capacity: usize, in_flight: usize, window: u32) {
        let mut guard = self.inner.lock();
        guard.cache_entries = entries;
        guard.cache_capacity = capacity;
        guard.in_flight = in_flight;
        guard.prefetch_window = window;
    }

    /// Generate a snapshot of the current metrics for presentation.
    pub fn snapshot(&self) -> LoaderSnapshot {
        let guard = self.inner.lock();

        let uptime = guard.started_at.elapsed();
        let cache_requests = guard.cache_requests.max(1);
        let cache_hit_ratio = guard.cache_hits as f32 / cache_requests as f32;

        LoaderSnapshot {
            timestamp_ms: now_ms(),
            uptime_ms: uptime.as_millis() as u64,
            fetch_time_ms_p50: guard.fetch_times_ms.percentile(0.50),
            fetch_time_ms_p95: guard.fetch_times_ms.percentile(0.95),
            decode_time_ms_p50: guard.decode_times_ms.percentile(0.50),
            decode_time_ms_p95: guard.decode_times_ms.percentile(0.95),
            cache_hit_ratio,
            cache_requests: guard.cache_requests,
            cache_entries: guard.cache_entries,
            cache_capacity: guard.cache_capacity,
            in_flight: guard.in_flight,
            prefetch_window: guard.prefetch_window,
            prefetch_failures: guard.prefetch_failures,
            pages_displayed: guard.pages_displayed,
        }
    }
}

fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(delta) => delta.as_millis() as u64,
        Err(err) => {
            warn!("system clock error: {err}");
            0
        }
    }
}

/// Immutable snapshot handed to the embedder.
#[derive(Debug, Clone, Serialize)]
pub struct LoaderSnapshot {
    pub timestamp_ms: u64,
    pub uptime_ms: u64,
    pub fetch_time_ms_p50: f32,
    pub fetch_time_ms_p95: f32,
    pub decode_time_ms_p50: f32,
    pub decode_time_ms_p95: f32,
    pub cache_hit_ratio: f32,
    pub cache_requests: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub in_flight: usize,
    pub prefetch_window: u32,
    pub prefetch_failures: u64,
    pub pages_displayed: u64,
}

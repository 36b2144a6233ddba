//! Memory, visibility, and connectivity pressure responses.
//!
//! The embedder pushes platform signals in; the monitor resizes the shared
//! cache and coordinator and nudges the planner. Nothing here polls, and
//! nothing here runs on the navigation hot path.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::config::PressureConfig;
use crate::fetch::FetchCoordinator;
use crate::pipeline::ReadingPlanner;

/// Effective connection quality as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Low,
    Medium,
    High,
    Unknown,
}

impl NetworkQuality {
    /// Classify a platform effective-type string plus the save-data flag.
    pub fn classify(effective_type: &str, save_data: bool) -> Self {
        if save_data {
            return Self::Low;
        }
        match effective_type {
            "4g" => Self::High,
            "3g" => Self::Medium,
            "2g" | "slow-2g" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    /// Capacity to restore when the session returns to the foreground.
    foreground_capacity: Option<usize>,
}

/// Reacts to platform pressure signals for one viewing session.
#[derive(Debug)]
pub struct PressureMonitor {
    cache: Arc<Mutex<PageCache>>,
    planner: Arc<Mutex<ReadingPlanner>>,
    coordinator: Arc<FetchCoordinator>,
    config: PressureConfig,
    baseline_concurrency: usize,
    state: Mutex<MonitorState>,
}

impl PressureMonitor {
    pub fn new(
        cache: Arc<Mutex<PageCache>>,
        planner: Arc<Mutex<ReadingPlanner>>,
        coordinator: Arc<FetchCoordinator>,
        config: PressureConfig,
    ) -> Self {
        let baseline_concurrency = coordinator.max_concurrent();
        Self {
            cache,
            planner,
            coordinator,
            config,
            baseline_concurrency,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Handle a memory-usage sample in `[0, 1]`.
    ///
    /// Above the threshold the cache capacity is cut to a fraction of the
    /// entries actually resident, floored so a burst of pressure cannot
    /// leave the reader with nothing. Eviction itself stays lazy.
    pub fn on_memory_sample(&self, used_ratio: f64) {
        if used_ratio <= self.config.memory_threshold {
            return;
        }

        let mut cache = self.cache.lock();
        let target = ((cache.len() as f64 * self.config.shrink_ratio) as usize)
            .max(self.config.capacity_floor);
        if target < cache.capacity() {
            warn!(
                target: "monitor",
                used_ratio,
                capacity = target,
                "memory pressure: shrinking page cache"
            );
            cache.set_capacity(target);
        }
    }

    /// Handle foreground/background transitions.
    ///
    /// Backgrounding halves the cache capacity; the original value comes
    /// back only when the session is foregrounded again. (The restore is
    /// deliberately gated on visibility rather than a fixed timer.)
    pub fn on_visibility_change(&self, visible: bool) {
        let mut state = self.state.lock();
        if !visible {
            if state.foreground_capacity.is_none() {
                let mut cache = self.cache.lock();
                let original = cache.capacity();
                state.foreground_capacity = Some(original);
                let reduced = (original / 2).max(self.config.background_floor);
                cache.set_capacity(reduced);
                debug!(target: "monitor", reduced, "backgrounded: cache capacity halved");
            }
        } else if let Some(original) = state.foreground_capacity.take() {
            self.cache.lock().set_capacity(original);
            debug!(target: "monitor", original, "foregrounded: cache capacity restored");
        }
    }

    /// Handle a connectivity change.
    ///
    /// Upgrades to fast connectivity widen the look-ahead and restore the
    /// baseline download concurrency. Downgrades throttle the cache and
    /// coordinator but never shrink the look-ahead window.
    pub fn on_network_change(&self, quality: NetworkQuality) {
        match quality {
            NetworkQuality::High => {
                self.planner.lock().boost(self.config.network_boost);
                self.coordinator.set_max_concurrent(self.baseline_concurrency);
                info!(target: "monitor", "fast connectivity: widened look-ahead");
            }
            NetworkQuality::Low => {
                self.coordinator.set_max_concurrent(self.config.save_data_concurrency);
                let mut cache = self.cache.lock();
                let capped = cache.capacity().min(self.config.save_data_capacity);
                cache.set_capacity(capped);
                info!(target: "monitor", capacity = capped, "constrained connectivity: throttled");
            }
            NetworkQuality::Medium | NetworkQuality::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cache::{CacheEntry, PageResource};
    use crate::codec::DecodedImage;
    use crate::config::{FetchConfig, PlannerConfig};
    use crate::types::{ImageDimensions, PageKey};

    fn entry(page: u32) -> CacheEntry {
        let image = DecodedImage {
            dimensions: ImageDimensions { width: 1, height: 1 },
            pixels: vec![0; 4],
        };
        CacheEntry::new(page, Arc::new(PageResource::new(image)))
    }

    fn monitor(capacity: usize) -> (PressureMonitor, Arc<Mutex<PageCache>>) {
        let cache = Arc::new(Mutex::new(PageCache::new(capacity)));
        let planner = Arc::new(Mutex::new(ReadingPlanner::new(PlannerConfig::default())));
        let coordinator = Arc::new(FetchCoordinator::new(FetchConfig::default()));
        let monitor = PressureMonitor::new(
            Arc::clone(&cache),
            planner,
            coordinator,
            PressureConfig::default(),
        );
        (monitor, cache)
    }

    #[test]
    fn classifies_platform_signals() {
        assert_eq!(NetworkQuality::classify("4g", false), NetworkQuality::High);
        assert_eq!(NetworkQuality::classify("3g", false), NetworkQuality::Medium);
        assert_eq!(NetworkQuality::classify("slow-2g", false), NetworkQuality::Low);
        assert_eq!(NetworkQuality::classify("4g", true), NetworkQuality::Low);
        assert_eq!(NetworkQuality::classify("wimax", false), NetworkQuality::Unknown);
    }

    #[test]
    fn memory_pressure_shrinks_towards_resident_entries() {
        let (monitor, cache) = monitor(100);
        for page in 1..=60 {
            cache.lock().put(PageKey::new(format!("p{page}")), entry(page));
        }

        monitor.on_memory_sample(0.85);
        assert_eq!(cache.lock().capacity(), 42);
    }

    #[test]
    fn memory_pressure_respects_the_floor() {
        let (monitor, cache) = monitor(100);
        for page in 1..=10 {
            cache.lock().put(PageKey::new(format!("p{page}")), entry(page));
        }

        monitor.on_memory_sample(0.95);
        assert_eq!(cache.lock().capacity(), 20);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let (monitor, cache) = monitor(100);
        monitor.on_memory_sample(0.5);
        assert_eq!(cache.lock().capacity(), 100);
    }

    #[test]
    fn backgrounding_halves_and_foregrounding_restores() {
        let (monitor, cache) = monitor(80);

        monitor.on_visibility_change(false);
        assert_eq!(cache.lock().capacity(), 40);

        // Repeated background signals keep the original capacity on file.
        monitor.on_visibility_change(false);
        assert_eq!(cache.lock().capacity(), 40);

        monitor.on_visibility_change(true);
        assert_eq!(cache.lock().capacity(), 80);
    }

    #[test]
    fn fast_network_widens_look_ahead_but_never_narrows() {
        let cache = Arc::new(Mutex::new(PageCache::new(50)));
        let planner = Arc::new(Mutex::new(ReadingPlanner::new(PlannerConfig::default())));
        let coordinator = Arc::new(FetchCoordinator::new(FetchConfig::default()));
        let monitor = PressureMonitor::new(
            Arc::clone(&cache),
            Arc::clone(&planner),
            coordinator,
            PressureConfig::default(),
        );

        monitor.on_network_change(NetworkQuality::High);
        assert_eq!(planner.lock().window(), 5);

        monitor.on_network_change(NetworkQuality::Medium);
        monitor.on_network_change(NetworkQuality::Unknown);
        assert_eq!(planner.lock().window(), 5);
    }

    #[tokio::test]
    async fn constrained_network_throttles_cache_and_downloads() {
        let cache = Arc::new(Mutex::new(PageCache::new(50)));
        let planner = Arc::new(Mutex::new(ReadingPlanner::new(PlannerConfig::default())));
        let coordinator = Arc::new(FetchCoordinator::new(FetchConfig::default()));
        let monitor = PressureMonitor::new(
            Arc::clone(&cache),
            Arc::clone(&planner),
            Arc::clone(&coordinator),
            PressureConfig::default(),
        );

        monitor.on_network_change(NetworkQuality::Low);
        assert_eq!(cache.lock().capacity(), 20);
        assert_eq!(coordinator.max_concurrent(), 2);
        // Look-ahead is untouched by downgrades.
        assert_eq!(planner.lock().window(), 3);

        monitor.on_network_change(NetworkQuality::High);
        assert_eq!(coordinator.max_concurrent(), 3);
    }
}

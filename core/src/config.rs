//! Runtime tunables for the viewer engine.
//!
//! One construction-time struct per concern; every component takes the piece
//! it needs by value. Defaults mirror the behaviour the engine was tuned
//! against: a 50-entry page cache, three parallel downloads, a one second
//! progress debounce.

use std::time::Duration;

/// Top-level configuration handed to the composition root.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub planner: PlannerConfig,
    pub loader: LoaderConfig,
    pub pressure: PressureConfig,
    pub zoom: ZoomConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            planner: PlannerConfig::default(),
            loader: LoaderConfig::default(),
            pressure: PressureConfig::default(),
            zoom: ZoomConfig::default(),
        }
    }
}

/// Page cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum number of decoded pages kept resident.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// Fetch coordinator limits and deadlines.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// Maximum simultaneous downloads across all pages.
    pub max_concurrent: usize,
    /// Deadline for the raw byte transfer.
    pub fetch_timeout: Duration,
    /// Separate deadline for the decode/validate step.
    pub validate_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            fetch_timeout: Duration::from_secs(30),
            validate_timeout: Duration::from_secs(15),
        }
    }
}

/// Adaptive look-ahead tuning.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Number of recent transition durations retained.
    pub sample_capacity: usize,
    /// Samples required before the window is recomputed.
    pub min_samples: usize,
    pub min_window: u32,
    pub max_window: u32,
    pub initial_window: u32,
    /// Mean transition time below this grows the window.
    pub fast_threshold: Duration,
    /// Mean transition time above this shrinks it.
    pub slow_threshold: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            sample_capacity: 10,
            min_samples: 3,
            min_window: 2,
            max_window: 10,
            initial_window: 3,
            fast_threshold: Duration::from_millis(3_000),
            slow_threshold: Duration::from_millis(10_000),
        }
    }
}

/// Navigation orchestration knobs.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// Quiet period before reading progress is persisted.
    pub save_debounce: Duration,
    /// Pages kept on each side of the current one by the periodic trim.
    pub trim_radius: u32,
    /// A trim is scheduled every this many displayed pages.
    pub trim_interval: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(1_000),
            trim_radius: 10,
            trim_interval: 20,
        }
    }
}

/// Memory/network pressure response thresholds.
#[derive(Debug, Clone, Copy)]
pub struct PressureConfig {
    /// Memory-usage ratio above which the cache is shrunk.
    pub memory_threshold: f64,
    /// Shrink target as a fraction of the current entry count.
    pub shrink_ratio: f64,
    /// Absolute lower bound for cache capacity under pressure.
    pub capacity_floor: usize,
    /// Lower bound while the session is backgrounded.
    pub background_floor: usize,
    /// Cache capacity imposed when the connection asks to save data.
    pub save_data_capacity: usize,
    /// Concurrency bound imposed under low-quality connectivity.
    pub save_data_concurrency: usize,
    /// Planner window bump applied on an upgrade to fast connectivity.
    pub network_boost: u32,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            memory_threshold: 0.70,
            shrink_ratio: 0.70,
            capacity_floor: 20,
            background_floor: 10,
            save_data_capacity: 20,
            save_data_concurrency: 2,
            network_boost: 2,
        }
    }
}

/// Zoom clamp for the viewer session.
#[derive(Debug, Clone, Copy)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self { min: 0.5, max: 3.0, step: 0.25 }
    }
}

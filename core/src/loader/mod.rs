//! Navigation orchestration: the composition root of a viewing session.
//!
//! `PageLoader` owns the cache, coordinator, and planner for one session
//! and is the only place retry policy lives. Navigation follows
//! `Idle -> Loading -> {Displayed, Failed}`; display follows the most
//! recent request, not the most recent completion.

mod session;

pub use session::{DisplayedPage, NavPhase, Zoom};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, PageCache, PageResource};
use crate::config::{LoaderConfig, ViewerConfig};
use crate::fetch::{FetchCoordinator, FetchError, Identity, PageSource};
use crate::pipeline::{ReadingPlanner, plan_window};
use crate::stats::{LoaderSnapshot, StatsCollector};
use crate::store::ProgressStore;
use crate::types::Book;

use session::SessionState;

/// Orchestrates page display for one open book.
///
/// Cheap to clone; clones share the same session. Callers that receive
/// `Err(FetchError::AuthExpired)` must send the user back through
/// sign-in, since the single refresh attempt has already been spent. Any
/// other error is retryable by navigating to the same page again.
#[derive(Debug, Clone)]
pub struct PageLoader {
    inner: Arc<LoaderInner>,
}

#[derive(Debug)]
struct LoaderInner {
    book: Book,
    config: LoaderConfig,
    cache: Arc<Mutex<PageCache>>,
    coordinator: Arc<FetchCoordinator>,
    planner: Arc<Mutex<ReadingPlanner>>,
    source: Arc<dyn PageSource>,
    identity: Arc<dyn Identity>,
    progress: Arc<dyn ProgressStore>,
    stats: Arc<StatsCollector>,
    state: Mutex<SessionState>,
    /// Monotonic navigation stamp; a settled fetch only applies if it still
    /// carries the newest stamp.
    generation: AtomicU64,
    displayed_count: AtomicU64,
    save_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PageLoader {
    /// Build a session over `book`, constructing the cache, coordinator,
    /// and planner from `config`. Use the handle accessors to wire up a
    /// pressure monitor.
    pub fn new(
        book: Book,
        config: &ViewerConfig,
        source: Arc<dyn PageSource>,
        identity: Arc<dyn Identity>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        let stats = Arc::new(StatsCollector::new());
        let inner = LoaderInner {
            state: Mutex::new(SessionState::new(config.zoom)),
            cache: Arc::new(Mutex::new(PageCache::new(config.cache.capacity))),
            coordinator: Arc::new(FetchCoordinator::with_stats(config.fetch, Arc::clone(&stats))),
            planner: Arc::new(Mutex::new(ReadingPlanner::new(config.planner))),
            config: config.loader,
            book,
            source,
            identity,
            progress,
            stats,
            generation: AtomicU64::new(0),
            displayed_count: AtomicU64::new(0),
            save_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn book(&self) -> &Book {
        &self.inner.book
    }

    pub fn current_page(&self) -> u32 {
        self.inner.state.lock().current_page
    }

    pub fn phase(&self) -> NavPhase {
        self.inner.state.lock().phase
    }

    /// The page the renderer should be showing, if any.
    pub fn displayed(&self) -> Option<DisplayedPage> {
        self.inner.state.lock().displayed.clone()
    }

    pub fn zoom_level(&self) -> f32 {
        self.inner.state.lock().zoom.level()
    }

    pub fn zoom_in(&self) -> f32 {
        self.inner.state.lock().zoom.zoom_in()
    }

    pub fn zoom_out(&self) -> f32 {
        self.inner.state.lock().zoom.zoom_out()
    }

    pub fn set_zoom(&self, level: f32) -> f32 {
        self.inner.state.lock().zoom.set(level)
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn cache_handle(&self) -> Arc<Mutex<PageCache>> {
        Arc::clone(&self.inner.cache)
    }

    pub fn planner_handle(&self) -> Arc<Mutex<ReadingPlanner>> {
        Arc::clone(&self.inner.planner)
    }

    pub fn coordinator_handle(&self) -> Arc<FetchCoordinator> {
        Arc::clone(&self.inner.coordinator)
    }

    /// Page to resume from: the stored progress record clamped into range,
    /// or page 1.
    pub async fn starting_page(&self) -> u32 {
        let total = self.inner.book.total_pages().max(1);
        match self.inner.progress.load(&self.inner.book.id).await {
            Ok(Some(record)) => record.current_page.clamp(1, total),
            Ok(None) => 1,
            Err(err) => {
                warn!(target: "loader", %err, "failed to load saved progress");
                1
            }
        }
    }

    /// Display the saved position (or the first page).
    pub async fn resume(&self) -> Result<(), FetchError> {
        let start = self.starting_page().await;
        self.go_to_page(start).await
    }

    /// Navigate to page `requested` (clamped into range).
    ///
    /// Repeating the current page while it is loading or displayed is a
    /// no-op. On success the displayed page is updated, progress
    /// persistence is debounced, and look-ahead prefetch is kicked off in
    /// the background.
    pub async fn go_to_page(&self, requested: u32) -> Result<(), FetchError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Cancelled);
        }
        let total = inner.book.total_pages();
        if total == 0 {
            return Err(FetchError::Network("book has no pages".into()));
        }
        let target = requested.clamp(1, total);

        let generation = {
            let mut state = inner.state.lock();
            if target == state.current_page
                && matches!(state.phase, NavPhase::Loading | NavPhase::Displayed)
            {
                debug!(target: "loader", page = target, "navigation is a no-op");
                return Ok(());
            }
            if state.current_page != target {
                inner.planner.lock().record_transition();
            }
            state.current_page = target;
            state.phase = NavPhase::Loading;
            inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        info!(target: "loader", page = target, "navigating");

        match self.load_with_refresh(target).await {
            Ok(resource) => {
                {
                    let mut state = inner.state.lock();
                    if inner.generation.load(Ordering::SeqCst) != generation {
                        debug!(target: "loader", page = target, "discarding superseded result");
                        return Ok(());
                    }
                    state.phase = NavPhase::Displayed;
                    state.displayed = Some(DisplayedPage { page: target, resource });
                    state.zoom.reset();
                }

                inner.stats.record_page_displayed();
                let shown = inner.displayed_count.fetch_add(1, Ordering::SeqCst) + 1;
                self.schedule_progress_save();
                self.spawn_prefetch(target);
                if shown % inner.config.trim_interval == 0 {
                    self.spawn_trim(target);
                }
                self.publish_gauges();
                Ok(())
            }
            Err(err) => {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    debug!(target: "loader", page = target, "ignoring superseded failure");
                    return Ok(());
                }
                inner.state.lock().phase = NavPhase::Failed;
                warn!(target: "loader", page = target, %err, "page load failed");
                Err(err)
            }
        }
    }

    /// Persist the current position immediately, refuse new transfers, and
    /// drain the cache. Call on navigation away from the viewer.
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        if let Some(pending) = inner.save_task.lock().take() {
            pending.abort();
        }
        self.persist_progress().await;
        inner.coordinator.shutdown();
        inner.cache.lock().clear();

        let mut state = inner.state.lock();
        state.displayed = None;
        state.phase = NavPhase::Idle;
    }

    /// Load with the bounded credential-refresh policy: exactly one
    /// refresh-and-retry on `AuthExpired`, then fail for good.
    async fn load_with_refresh(&self, page: u32) -> Result<Arc<PageResource>, FetchError> {
        let mut refreshed = false;
        loop {
            match self.load_page(page).await {
                Err(FetchError::AuthExpired) if !refreshed => {
                    refreshed = true;
                    info!(target: "loader", "credentials expired, attempting one refresh");
                    if !self.inner.identity.refresh().await {
                        return Err(FetchError::AuthExpired);
                    }
                }
                other => return other,
            }
        }
    }

    /// Cache-or-fetch for a single page. No retry policy here: prefetch
    /// calls this directly so background failures stay silent.
    async fn load_page(&self, page: u32) -> Result<Arc<PageResource>, FetchError> {
        let inner = &self.inner;
        let meta = inner
            .book
            .page(page)
            .ok_or_else(|| FetchError::Network(format!("page {page} out of range")))?;

        if let Some(resource) = inner.cache.lock().get(&meta.key) {
            inner.stats.record_cache_lookup(true);
            return Ok(resource);
        }
        inner.stats.record_cache_lookup(false);

        let token = inner.identity.access_token().ok_or(FetchError::AuthExpired)?;
        let source = Arc::clone(&inner.source);
        let fetch_key = meta.key.clone();
        let fetch = async move { source.fetch_bytes(&fetch_key, &token).await };

        let started = Instant::now();
        let resource = inner.coordinator.acquire(&meta.key, &meta.name, fetch).await?;
        inner.stats.record_fetch(started.elapsed());

        // A settle racing session teardown must not repopulate the drained cache.
        if inner.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Cancelled);
        }
        inner.cache.lock().put(meta.key.clone(), CacheEntry::new(page, Arc::clone(&resource)));
        Ok(resource)
    }

    /// Collapse navigation bursts into a single progress write shortly
    /// after the last transition.
    fn schedule_progress_save(&self) {
        let loader = self.clone();
        let debounce = self.inner.config.save_debounce;
        let mut slot = self.inner.save_task.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            loader.persist_progress().await;
        }));
    }

    async fn persist_progress(&self) {
        let inner = &self.inner;
        let page = inner.state.lock().current_page;
        if let Err(err) = inner.progress.save(&inner.book.id, page, inner.book.total_pages()).await
        {
            warn!(target: "loader", %err, "failed to persist reading progress");
        }
    }

    fn spawn_prefetch(&self, center: u32) {
        let loader = self.clone();
        tokio::spawn(async move {
            loader.run_prefetch(center).await;
        });
    }

    async fn run_prefetch(&self, center: u32) {
        let inner = &self.inner;
        let window = inner.planner.lock().window();
        let total = inner.book.total_pages();

        let tasks = {
            let cache = inner.cache.lock();
            plan_window(center, total, window, |page| {
                // Pages without metadata count as cached so they are skipped.
                inner.book.page(page).map(|meta| cache.has(&meta.key)).unwrap_or(true)
            })
        };
        if tasks.is_empty() {
            return;
        }

        debug!(target: "loader", center, window, count = tasks.len(), "prefetching window");

        let fetches = tasks.into_iter().map(|task| {
            let loader = self.clone();
            async move {
                if let Err(err) = loader.load_page(task.page).await {
                    loader.inner.stats.record_prefetch_failure();
                    debug!(
                        target: "loader",
                        page = task.page,
                        priority = ?task.priority,
                        %err,
                        "prefetch failed"
                    );
                }
            }
        });
        futures::future::join_all(fetches).await;
        self.publish_gauges();
    }

    fn spawn_trim(&self, center: u32) {
        let loader = self.clone();
        let radius = self.inner.config.trim_radius;
        tokio::spawn(async move {
            // Let interactive work already queued on the executor run first.
            tokio::task::yield_now().await;
            let removed = loader.inner.cache.lock().evict_outside_window(center, radius);
            debug!(target: "loader", center, removed, "periodic cache trim");
        });
    }

    fn publish_gauges(&self) {
        let inner = &self.inner;
        let (entries, capacity) = {
            let cache = inner.cache.lock();
            (cache.len(), cache.capacity())
        };
        inner.stats.update_pipeline(
            entries,
            capacity,
            inner.coordinator.in_flight_len(),
            inner.planner.lock().window(),
        );
    }
}

//! Shared download scheduler: per-key deduplication, a semaphore-bounded
//! concurrency limit, and independent fetch/validate deadlines.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task;
use tokio::time::timeout;
use tracing::debug;

use crate::cache::PageResource;
use crate::codec::decode_page;
use crate::config::FetchConfig;
use crate::stats::StatsCollector;
use crate::types::PageKey;

use super::FetchError;

type FetchResult = Result<Arc<PageResource>, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Coordinates every download of the viewing session.
///
/// A second `acquire` for a key that is already in flight attaches to the
/// pending result instead of fetching again. Actual transfers are gated by
/// a semaphore; waiters are released in arrival order as slots free up.
/// The coordinator performs no retries of its own; retry policy lives in
/// the page loader so the one-refresh bound stays in a single place.
pub struct FetchCoordinator {
    in_flight: Arc<Mutex<HashMap<PageKey, SharedFetch>>>,
    permits: Arc<Semaphore>,
    limit: Mutex<usize>,
    active: Arc<AtomicUsize>,
    stats: Option<Arc<StatsCollector>>,
    config: FetchConfig,
}

impl FetchCoordinator {
    pub fn new(config: FetchConfig) -> Self {
        let limit = config.max_concurrent.max(1);
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(limit)),
            limit: Mutex::new(limit),
            active: Arc::new(AtomicUsize::new(0)),
            stats: None,
            config,
        }
    }

    /// Coordinator reporting decode latency into the session's collector.
    pub fn with_stats(config: FetchConfig, stats: Arc<StatsCollector>) -> Self {
        Self { stats: Some(stats), ..Self::new(config) }
    }

    /// Acquire the decoded image for `key`, running `fetch` at most once
    /// per in-flight window.
    ///
    /// `name` is the page's file name, forwarded to the decoder for format
    /// selection. The returned resource is freshly decoded and not yet
    /// cached; the caller owns insertion.
    pub async fn acquire<F>(&self, key: &PageKey, name: &str, fetch: F) -> FetchResult
    where
        F: Future<Output = Result<Bytes, FetchError>> + Send + 'static,
    {
        let shared = {
            let mut guard = self.in_flight.lock();
            if let Some(existing) = guard.get(key) {
                debug!(target: "fetch", key = key.as_str(), "attached to in-flight request");
                existing.clone()
            } else {
                let started = self.start_fetch(key.clone(), name.to_string(), fetch);
                guard.insert(key.clone(), started.clone());
                started
            }
        };

        shared.await
    }

    /// Number of requests currently awaiting or transferring.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of transfers holding a concurrency slot right now.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        *self.limit.lock()
    }

    /// Adjust the concurrency bound at runtime.
    ///
    /// Raising the bound frees waiters immediately. Lowering it retires the
    /// surplus slots as running transfers hand them back, so nothing
    /// already started is interrupted. Must be called from a runtime
    /// context when lowering.
    pub fn set_max_concurrent(&self, new_limit: usize) {
        let new_limit = new_limit.max(1);
        let mut limit = self.limit.lock();
        if new_limit > *limit {
            self.permits.add_permits(new_limit - *limit);
        } else if new_limit < *limit {
            let surplus = (*limit - new_limit) as u32;
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                if let Ok(retired) = permits.acquire_many_owned(surplus).await {
                    retired.forget();
                }
            });
        }
        *limit = new_limit;
    }

    /// Refuse new transfers; pending `acquire` calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    fn start_fetch<F>(&self, key: PageKey, name: String, fetch: F) -> SharedFetch
    where
        F: Future<Output = Result<Bytes, FetchError>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let permits = Arc::clone(&self.permits);
        let active = Arc::clone(&self.active);
        let stats = self.stats.clone();
        let fetch_timeout = self.config.fetch_timeout;
        let validate_timeout = self.config.validate_timeout;

        async move {
            let result =
                run_fetch(permits, active, stats, fetch_timeout, validate_timeout, &name, fetch)
                    .await;
            // Settled either way: the next acquire for this key starts fresh.
            in_flight.lock().remove(&key);
            if let Err(ref err) = result {
                debug!(target: "fetch", key = key.as_str(), %err, "fetch settled with error");
            }
            result
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.in_flight.lock().len())
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("limit", &*self.limit.lock())
            .finish()
    }
}

async fn run_fetch<F>(
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    stats: Option<Arc<StatsCollector>>,
    fetch_timeout: std::time::Duration,
    validate_timeout: std::time::Duration,
    name: &str,
    fetch: F,
) -> FetchResult
where
    F: Future<Output = Result<Bytes, FetchError>> + Send + 'static,
{
    let permit =
        permits.acquire_owned().await.map_err(|_| FetchError::Cancelled)?;
    let _slot = SlotGuard::take(permit, &active);

    let bytes = match timeout(fetch_timeout, fetch).await {
        Ok(result) => result?,
        Err(_) => return Err(FetchError::Timeout),
    };

    let decode_name = name.to_string();
    let decode_started = std::time::Instant::now();
    let decoded = match timeout(
        validate_timeout,
        task::spawn_blocking(move || decode_page(&decode_name, &bytes)),
    )
    .await
    {
        Ok(Ok(Ok(image))) => image,
        Ok(Ok(Err(err))) => return Err(FetchError::Decode(err.to_string())),
        Ok(Err(join_err)) => return Err(FetchError::Decode(join_err.to_string())),
        Err(_) => return Err(FetchError::Timeout),
    };
    if let Some(stats) = stats {
        stats.record_decode(decode_started.elapsed());
    }

    Ok(Arc::new(PageResource::new(decoded)))
}

/// Pairs the in-flight counter with the semaphore permit so both are
/// returned on every exit path.
struct SlotGuard {
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    fn take(permit: OwnedSemaphorePermit, active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self { active: Arc::clone(active), _permit: permit }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

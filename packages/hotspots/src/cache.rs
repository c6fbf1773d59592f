//! Time-to-live cache around the materialized [`RiskDataset`].
//!
//! Readers never observe a partially built dataset. When the entry is
//! missing or expired, exactly one caller recomputes while concurrent
//! callers wait for that result instead of starting their own. A recompute
//! that outlives its timeout stays the only one in flight until it ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Local};
use tokio::task::JoinHandle;

use crate::RiskDataset;
use crate::materializer::MaterializeError;

/// Source of the current time, in the server's local offset.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the process's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Produces a fresh dataset for a clock reading.
#[async_trait::async_trait]
pub trait DatasetLoader: Send + Sync {
    /// Materializes the dataset as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError`] if any part of the pipeline fails.
    async fn load(&self, now: DateTime<FixedOffset>) -> Result<RiskDataset, MaterializeError>;
}

/// Cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a dataset stays fresh.
    pub ttl: Duration,
    /// Upper bound on a single recompute. `None` waits indefinitely.
    pub recompute_timeout: Option<Duration>,
    /// After a failed recompute, how long to wait before trying again.
    pub retry_backoff: Duration,
    /// Whether an expired dataset is served when a recompute fails.
    pub serve_stale_on_failure: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            recompute_timeout: Some(Duration::from_secs(120)),
            retry_backoff: Duration::from_secs(30),
            serve_stale_on_failure: true,
        }
    }
}

/// Errors surfaced by [`RiskCache::get`] when nothing can be served.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The recompute failed.
    #[error(transparent)]
    Recompute(#[from] MaterializeError),

    /// The recompute did not finish in time.
    #[error("Recompute timed out after {after:?}")]
    Timeout {
        /// Configured timeout.
        after: Duration,
    },

    /// A recent recompute failed and the retry backoff has not elapsed.
    #[error("Recompute failed recently; retrying in {retry_in:?}")]
    Backoff {
        /// Time left before the next attempt.
        retry_in: Duration,
    },
}

#[derive(Clone)]
struct CacheEntry {
    dataset: Arc<RiskDataset>,
    computed_at: DateTime<FixedOffset>,
}

/// A recompute running on its own task.
struct Recompute {
    handle: JoinHandle<Result<RiskDataset, MaterializeError>>,
    computed_for: DateTime<FixedOffset>,
    started: Instant,
}

/// Process-wide holder of the current [`RiskDataset`].
pub struct RiskCache {
    loader: Arc<dyn DatasetLoader>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    entry: RwLock<Option<CacheEntry>>,
    last_failure: RwLock<Option<DateTime<FixedOffset>>>,
    recompute: tokio::sync::Mutex<Option<Recompute>>,
    recomputes: AtomicU64,
}

impl RiskCache {
    /// Creates an empty cache. Nothing is computed until the first
    /// [`get`](Self::get).
    #[must_use]
    pub fn new(loader: Arc<dyn DatasetLoader>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            loader,
            clock,
            config,
            entry: RwLock::new(None),
            last_failure: RwLock::new(None),
            recompute: tokio::sync::Mutex::new(None),
            recomputes: AtomicU64::new(0),
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of recomputes started since creation.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Returns a fresh dataset, recomputing it first if the entry is
    /// missing or older than the TTL.
    ///
    /// A recompute that outlives the timeout keeps running in the
    /// background. Later callers wait for that task instead of starting
    /// another, and pick up its result once it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if a recompute is needed, fails (or is in
    /// backoff), and there is no stale entry to fall back to.
    pub async fn get(&self) -> Result<Arc<RiskDataset>, CacheError> {
        if let Some(dataset) = self.fresh(self.clock.now()) {
            return Ok(dataset);
        }

        let mut inflight = self.recompute.lock().await;

        // Another caller may have refreshed the entry while we waited.
        let now = self.clock.now();
        if let Some(dataset) = self.fresh(now) {
            return Ok(dataset);
        }

        let stale = self.current().map(|entry| entry.dataset);

        // A task that already finished is collected even during backoff.
        let finished = inflight
            .as_ref()
            .is_some_and(|task| task.handle.is_finished());
        if !finished && let Some(retry_in) = self.backoff_remaining(now) {
            return match stale {
                Some(dataset) if self.config.serve_stale_on_failure => {
                    log::warn!("Recompute in backoff for {retry_in:?}, serving stale dataset");
                    Ok(dataset)
                }
                _ => Err(CacheError::Backoff { retry_in }),
            };
        }

        if let Some(task) = inflight.as_ref() {
            log::info!(
                "Waiting for recompute started at {} ({:?} ago)",
                task.computed_for,
                task.started.elapsed()
            );
        }
        let task = inflight.get_or_insert_with(|| self.spawn(now));
        let (computed_for, started) = (task.computed_for, task.started);

        let outcome = match self.config.recompute_timeout {
            Some(after) => tokio::time::timeout(after, &mut task.handle)
                .await
                .map_err(|_| CacheError::Timeout { after }),
            None => Ok((&mut task.handle).await),
        };
        if outcome.is_ok() {
            *inflight = None;
        }

        match outcome.and_then(|joined| {
            joined
                .map_err(|e| MaterializeError::Join(e.to_string()))?
                .map_err(CacheError::from)
        }) {
            Ok(dataset) => {
                log::info!(
                    "Recomputed risk dataset with {} segments in {:?}",
                    dataset.len(),
                    started.elapsed()
                );
                let dataset = Arc::new(dataset);
                *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(CacheEntry {
                    dataset: dataset.clone(),
                    computed_at: computed_for,
                });
                *self
                    .last_failure
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                Ok(dataset)
            }
            Err(e) => {
                log::error!("Risk dataset recompute failed: {e}");
                *self
                    .last_failure
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(self.clock.now());
                match stale {
                    Some(dataset) if self.config.serve_stale_on_failure => {
                        log::warn!("Serving stale risk dataset after failed recompute");
                        Ok(dataset)
                    }
                    _ => Err(e),
                }
            }
        }
    }

    /// Starts a recompute on its own task so that it survives a caller
    /// giving up on it.
    fn spawn(&self, now: DateTime<FixedOffset>) -> Recompute {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        log::info!("Recomputing risk dataset at {now}");
        let loader = self.loader.clone();
        Recompute {
            handle: tokio::spawn(async move { loader.load(now).await }),
            computed_for: now,
            started: Instant::now(),
        }
    }

    fn current(&self) -> Option<CacheEntry> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh(&self, now: DateTime<FixedOffset>) -> Option<Arc<RiskDataset>> {
        self.current()
            .filter(|entry| {
                // A clock that moved backwards leaves the entry fresh.
                let age = now
                    .signed_duration_since(entry.computed_at)
                    .to_std()
                    .unwrap_or_default();
                age <= self.config.ttl
            })
            .map(|entry| entry.dataset)
    }

    fn backoff_remaining(&self, now: DateTime<FixedOffset>) -> Option<Duration> {
        let failed_at = (*self
            .last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner))?;
        let since = now.signed_duration_since(failed_at).to_std().unwrap_or_default();
        self.config
            .retry_backoff
            .checked_sub(since)
            .filter(|remaining| !remaining.is_zero())
    }
}

impl std::fmt::Debug for RiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskCache")
            .field("config", &self.config)
            .field("recomputes", &self.recompute_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use accident_risk_models::TimeFeatures;

    use crate::materializer::FeatureMaterializer;
    use crate::model::{LabelEncoder, LinearRiskModel, ModelError};
    use crate::source::{Cell, FeatureSource, FeatureTable, SourceError, SourceRow};

    use super::*;

    struct ManualClock(Mutex<DateTime<FixedOffset>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Mutex::new(
                DateTime::parse_from_rfc3339("2024-03-04T08:00:00+05:30").unwrap(),
            ))
        }

        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<FixedOffset> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct TestLoader {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl TestLoader {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl DatasetLoader for TestLoader {
        async fn load(&self, now: DateTime<FixedOffset>) -> Result<RiskDataset, MaterializeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(MaterializeError::Model(ModelError::Prediction(
                    "boom".to_string(),
                )));
            }
            Ok(RiskDataset::new(Vec::new(), TimeFeatures::at(&now)))
        }
    }

    fn cache(loader: Arc<TestLoader>, clock: Arc<ManualClock>, config: CacheConfig) -> RiskCache {
        RiskCache::new(loader, clock, config)
    }

    #[tokio::test]
    async fn reuses_entry_until_ttl_expires() {
        let loader = Arc::new(TestLoader::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(loader.clone(), clock.clone(), CacheConfig::default());

        let first = cache.get().await.unwrap();
        clock.advance(300);
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        let third = cache.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.recompute_count(), 2);
        assert_eq!(third.time().hour, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_recompute() {
        let loader = Arc::new(TestLoader::slow(Duration::from_millis(50)));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(loader.clone(), clock, CacheConfig::default()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|d| Arc::ptr_eq(d, &results[0])));
    }

    #[tokio::test]
    async fn serves_stale_dataset_when_recompute_fails() {
        let loader = Arc::new(TestLoader::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(loader.clone(), clock.clone(), CacheConfig::default());

        let first = cache.get().await.unwrap();
        loader.fail.store(true, Ordering::SeqCst);
        clock.advance(301);

        let stale = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

        // Within the backoff window the loader is not called again.
        clock.advance(10);
        let stale = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

        loader.fail.store(false, Ordering::SeqCst);
        clock.advance(30);
        let fresh = cache.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cold_failure_surfaces_error_then_backs_off() {
        let loader = Arc::new(TestLoader::default());
        loader.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new());
        let cache = cache(loader.clone(), clock.clone(), CacheConfig::default());

        assert!(matches!(cache.get().await, Err(CacheError::Recompute(_))));

        clock.advance(5);
        match cache.get().await {
            Err(CacheError::Backoff { retry_in }) => {
                assert_eq!(retry_in, Duration::from_secs(25));
            }
            other => panic!("expected backoff, got {other:?}"),
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_is_not_served_when_disabled() {
        let loader = Arc::new(TestLoader::default());
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            serve_stale_on_failure: false,
            ..CacheConfig::default()
        };
        let cache = cache(loader.clone(), clock.clone(), config);

        cache.get().await.unwrap();
        loader.fail.store(true, Ordering::SeqCst);
        clock.advance(301);

        assert!(cache.get().await.is_err());
    }

    #[tokio::test]
    async fn slow_recompute_times_out() {
        let loader = Arc::new(TestLoader::slow(Duration::from_millis(500)));
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            recompute_timeout: Some(Duration::from_millis(20)),
            ..CacheConfig::default()
        };
        let cache = cache(loader, clock, config);

        assert!(matches!(
            cache.get().await,
            Err(CacheError::Timeout { after }) if after == Duration::from_millis(20)
        ));
    }

    /// Blocks the calling thread while reading, and tracks how many reads
    /// overlap.
    struct SlowSource {
        delay: Duration,
        loads: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                loads: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureSource for SlowSource {
        fn load(&self) -> Result<FeatureTable, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            Ok(FeatureTable {
                columns: vec!["speed_limit".to_string()],
                rows: vec![SourceRow {
                    grid_id: "G1".to_string(),
                    geometry_wkt: "POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))".to_string(),
                    values: vec![Cell::Number(60.0)],
                }],
            })
        }
    }

    fn blocking_cache(
        source: Arc<SlowSource>,
        clock: Arc<ManualClock>,
        config: CacheConfig,
    ) -> RiskCache {
        let model = LinearRiskModel {
            intercept: 0.8,
            ..LinearRiskModel::default()
        };
        let encoder = LabelEncoder::new(["G1".to_string()]);
        let materializer =
            FeatureMaterializer::new(source, Arc::new(model), Arc::new(encoder));
        RiskCache::new(Arc::new(materializer), clock, config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_blocking_recompute() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(100)));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(blocking_cache(source.clone(), clock, CacheConfig::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].len(), 1);
        assert!(results.iter().all(|d| Arc::ptr_eq(d, &results[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_recompute_is_awaited_not_restarted() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            recompute_timeout: Some(Duration::from_millis(50)),
            retry_backoff: Duration::from_secs(1),
            ..CacheConfig::default()
        };
        let cache = blocking_cache(source.clone(), clock.clone(), config);

        assert!(matches!(cache.get().await, Err(CacheError::Timeout { .. })));

        // Past the backoff, the blocking read from the first call is still
        // running. The second call waits on it rather than starting another.
        clock.advance(2);
        assert!(matches!(cache.get().await, Err(CacheError::Timeout { .. })));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;

        // Finished work is picked up even inside the backoff window.
        let dataset = cache.get().await.unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.time().hour, 8);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert_eq!(cache.recompute_count(), 1);

        // The collected dataset is cached like any other.
        let again = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&dataset, &again));
    }
}

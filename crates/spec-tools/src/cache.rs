//! Cached spec document + indexes with single-flight refresh.
//!
//! One process serves one spec, so there is exactly one cache slot. Freshness is
//! evaluated lazily on each access (no background refresh timer). Concurrent callers
//! that observe a stale or absent entry join a single coalesced fetch; a refresh never
//! mutates the current entry in place, it installs a replacement, so readers holding
//! the old `Arc` are never disturbed.

use crate::config::SpecSourceConfig;
use crate::error::{Result, SpecToolsError};
use crate::fetch::{SpecFetcher, parse_spec_body};
use crate::index::{EndpointEntry, SchemaEntry, build_endpoint_index, build_schema_index};
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source, injectable so tests control freshness without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One fetched document plus the indexes derived from exactly that document.
///
/// Entries are immutable once built; the cache replaces them wholesale.
#[derive(Debug)]
pub struct CacheEntry {
    pub document: Value,
    pub fetched_at: Instant,
    pub endpoints: Vec<EndpointEntry>,
    pub schemas: Vec<SchemaEntry>,
}

type FetchOutcome = std::result::Result<Arc<CacheEntry>, String>;
type InFlightFetch = Shared<BoxFuture<'static, FetchOutcome>>;

#[derive(Default)]
struct SlotState {
    entry: Option<Arc<CacheEntry>>,
    in_flight: Option<InFlightFetch>,
}

/// The shared cache slot for the process's spec document.
pub struct SpecCache {
    location: String,
    ttl: Duration,
    fetcher: Arc<dyn SpecFetcher>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SlotState>>,
}

impl SpecCache {
    #[must_use]
    pub fn new(config: &SpecSourceConfig, fetcher: Arc<dyn SpecFetcher>) -> Self {
        Self::with_clock(config, fetcher, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        config: &SpecSourceConfig,
        fetcher: Arc<dyn SpecFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            location: config.spec.clone(),
            ttl: config.ttl(),
            fetcher,
            clock,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    /// Return the current document + indexes, fetching or joining an in-flight fetch
    /// as needed.
    ///
    /// On refresh failure the previous entry (however stale) is served; only a failure
    /// with no prior successful fetch propagates.
    ///
    /// # Errors
    ///
    /// Returns an error if the first-ever fetch (or a fetch after [`Self::clear`])
    /// fails before any document is cached.
    pub async fn entry(&self) -> Result<Arc<CacheEntry>> {
        let fetch = {
            let mut state = self.state.lock();
            if let Some(entry) = &state.entry
                && self.clock.now().duration_since(entry.fetched_at) < self.ttl
            {
                return Ok(Arc::clone(entry));
            }
            match &state.in_flight {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let fetch = self.start_fetch();
                    state.in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };

        match fetch.await {
            Ok(entry) => Ok(entry),
            Err(message) => {
                let stale = self.state.lock().entry.clone();
                match stale {
                    Some(entry) => {
                        tracing::warn!(
                            spec = %self.location,
                            error = %message,
                            "spec refresh failed; serving stale cache"
                        );
                        Ok(entry)
                    }
                    None => Err(SpecToolsError::SpecRefresh { message }),
                }
            }
        }
    }

    /// Discard the cached entry, returning the slot to empty.
    ///
    /// An in-flight fetch is not cancelled; it still installs a fresh entry when it
    /// completes.
    pub fn clear(&self) {
        self.state.lock().entry = None;
    }

    /// Spawn the fetch as a detached task so it completes (and installs its result)
    /// even if every waiter disconnects mid-flight.
    fn start_fetch(&self) -> InFlightFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let location = self.location.clone();

        let task = tokio::spawn(async move {
            let outcome = fetch_entry(fetcher.as_ref(), clock.as_ref(), &location).await;
            let mut slot = state.lock();
            slot.in_flight = None;
            match outcome {
                Ok(entry) => {
                    let entry = Arc::new(entry);
                    slot.entry = Some(Arc::clone(&entry));
                    Ok(entry)
                }
                Err(e) => Err(e.to_string()),
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("spec fetch task failed: {e}")),
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_entry(
    fetcher: &dyn SpecFetcher,
    clock: &dyn Clock,
    location: &str,
) -> Result<CacheEntry> {
    let fetched = fetcher.fetch().await?;
    let document = parse_spec_body(&fetched.body, fetched.content_type.as_deref(), location)?;
    let endpoints = build_endpoint_index(&document);
    let schemas = build_schema_index(&document);
    tracing::debug!(
        spec = %location,
        endpoints = endpoints.len(),
        schemas = schemas.len(),
        "spec fetched and indexed"
    );
    Ok(CacheEntry {
        document,
        fetched_at: clock.now(),
        endpoints,
        schemas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedSpec;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const SPEC_BODY: &str = r#"{
        "openapi": "3.0.0",
        "info": { "title": "t", "version": "1" },
        "paths": { "/pets": { "get": { "summary": "List pets" } } },
        "components": { "schemas": { "Pet": { "type": "object" } } }
    }"#;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn starting_now() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock()
        }
    }

    struct ScriptedFetcher {
        hits: AtomicUsize,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            let f = Self::ok();
            f.fail.store(true, Ordering::SeqCst);
            f
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay: Some(delay),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpecFetcher for ScriptedFetcher {
        async fn fetch(&self) -> Result<FetchedSpec> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SpecToolsError::SpecFetch {
                    url: "http://test/spec".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(FetchedSpec {
                body: SPEC_BODY.to_string(),
                content_type: Some("application/json".to_string()),
            })
        }
    }

    fn config() -> SpecSourceConfig {
        let mut cfg = SpecSourceConfig::new("http://test/spec");
        cfg.ttl_secs = 60;
        cfg
    }

    #[tokio::test]
    async fn test_fresh_entry_serves_without_refetch() {
        let fetcher = ScriptedFetcher::ok();
        let cache = SpecCache::new(&config(), fetcher.clone());

        let first = cache.entry().await.unwrap();
        let second = cache.entry().await.unwrap();

        assert_eq!(fetcher.hits(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.endpoints.len(), 1);
        assert_eq!(first.schemas.len(), 1);
        assert_eq!(first.document["info"]["title"], json!("t"));
    }

    #[tokio::test]
    async fn test_ttl_expiry_triggers_refetch() {
        let fetcher = ScriptedFetcher::ok();
        let clock = ManualClock::starting_now();
        let cache = SpecCache::with_clock(&config(), fetcher.clone(), clock.clone());

        cache.entry().await.unwrap();
        clock.advance(Duration::from_secs(61));
        cache.entry().await.unwrap();

        assert_eq!(fetcher.hits(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_refetch_fails() {
        let fetcher = ScriptedFetcher::ok();
        let clock = ManualClock::starting_now();
        let cache = SpecCache::with_clock(&config(), fetcher.clone(), clock.clone());

        let first = cache.entry().await.unwrap();
        fetcher.fail.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(61));

        let fallback = cache.entry().await.unwrap();
        assert_eq!(fetcher.hits(), 2);
        assert!(Arc::ptr_eq(&first, &fallback));
    }

    #[tokio::test]
    async fn test_cold_start_failure_propagates() {
        let fetcher = ScriptedFetcher::failing();
        let cache = SpecCache::new(&config(), fetcher.clone());

        let err = cache.entry().await.unwrap_err();
        assert!(matches!(err, SpecToolsError::SpecRefresh { .. }));
        assert!(err.to_string().contains("connection refused"));

        // The slot stays empty; a later call retries.
        fetcher.fail.store(false, Ordering::SeqCst);
        assert!(cache.entry().await.is_ok());
        assert_eq!(fetcher.hits(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let fetcher = ScriptedFetcher::slow(Duration::from_millis(50));
        let cache = Arc::new(SpecCache::new(&config(), fetcher.clone()));

        let results = futures::future::join_all((0..8).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.entry().await }
        }))
        .await;

        assert_eq!(fetcher.hits(), 1);
        let first = results[0].as_ref().unwrap();
        for r in &results {
            assert!(Arc::ptr_eq(first, r.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_concurrent_cold_start_failure_reaches_all_waiters() {
        let fetcher = ScriptedFetcher::failing();
        let cache = Arc::new(SpecCache::new(&config(), fetcher.clone()));

        let results = futures::future::join_all((0..4).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.entry().await }
        }))
        .await;

        assert_eq!(fetcher.hits(), 1);
        assert!(results.iter().all(std::result::Result::is_err));
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let fetcher = ScriptedFetcher::ok();
        let cache = SpecCache::new(&config(), fetcher.clone());

        cache.entry().await.unwrap();
        cache.clear();
        cache.entry().await.unwrap();

        assert_eq!(fetcher.hits(), 2);
    }
}

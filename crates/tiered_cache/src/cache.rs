// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use task_dispatch::{PoolName, TaskDispatcher, TaskHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::memory::MemoryTier;
use crate::{
    AssetDecoder, CacheConfig, CacheKey, CacheStats, ClearSummary, Corruption, DiskStore, FetchError, KeyError, Origin,
    PlaceholderHint, PlaceholderKind, Resolved, Validation, validate,
};

/// Resolves URLs to decoded assets through memory, disk and the origin.
///
/// Cloning is cheap; clones share all tiers.
///
/// See the [crate documentation](crate) for the lookup order and its guarantees.
pub struct TieredCache<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    config: CacheConfig,
    memory: MemoryTier<A>,
    disk: Option<DiskStore>,
    origin: Arc<dyn Origin>,
    decoder: Arc<dyn AssetDecoder<Asset = A>>,
    dispatcher: Arc<TaskDispatcher>,
}

/// Why a loader gave up. Never leaves the crate; callers get a placeholder.
#[derive(Debug, Error)]
enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("origin sent unusable bytes: {0}")]
    Corrupt(Corruption),
}

impl<A> TieredCache<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Creates a cache.
    ///
    /// If the configured disk root cannot be created, the failure is logged and the cache
    /// runs without a disk tier for its whole lifetime.
    pub fn new(
        config: CacheConfig,
        origin: Arc<dyn Origin>,
        decoder: Arc<dyn AssetDecoder<Asset = A>>,
        dispatcher: Arc<TaskDispatcher>,
    ) -> Self {
        let disk = config
            .disk_root()
            .and_then(|root| match DiskStore::open(root, config.extension()) {
                Ok(store) => {
                    info!(root = %root.display(), "disk tier enabled");
                    Some(store)
                }
                Err(err) => {
                    error!(root = %root.display(), error = %err, "disk tier disabled");
                    None
                }
            });

        if config.disk_root().is_none() {
            debug!("no disk root configured, running without disk tier");
        }

        Self {
            inner: Arc::new(Inner {
                memory: MemoryTier::new(),
                disk,
                config,
                origin,
                decoder,
                dispatcher,
            }),
        }
    }

    /// Looks up `url`, blocking while disk or origin are consulted.
    ///
    /// Never fails:
    /// - an empty `url` yields a [`PlaceholderKind::NoCover`] placeholder right away;
    /// - a `url` that is not http(s) yields [`PlaceholderKind::Invalid`] without any I/O;
    /// - a failed load yields [`PlaceholderKind::NetworkError`] and is retried by the next call.
    ///
    /// Concurrent calls for the same `url` share one load.
    pub fn get(&self, url: &str, hint: PlaceholderHint) -> Resolved<A> {
        let key = match Self::parse(url) {
            Ok(key) => key,
            Err(placeholder) => return Resolved::placeholder(placeholder, hint),
        };

        match self.inner.memory.get_or_load(key.as_str(), || self.inner.load(&key)) {
            Ok(asset) => Resolved::Asset(asset),
            Err(err) => {
                warn!(key = %key, error = %err, "asset unavailable");
                Resolved::placeholder(PlaceholderKind::NetworkError, hint)
            }
        }
    }

    /// Looks up `url` on the dispatcher's image-fetch pool.
    ///
    /// Empty and invalid keys, as well as memory hits, resolve immediately without using
    /// a worker. If the dispatcher refuses the work, the handle resolves to a
    /// [`PlaceholderKind::NetworkError`] placeholder.
    pub fn load(&self, url: &str, hint: PlaceholderHint) -> TaskHandle<Resolved<A>> {
        let key = match Self::parse(url) {
            Ok(key) => key,
            Err(placeholder) => return TaskHandle::ready(Resolved::placeholder(placeholder, hint)),
        };

        if let Some(asset) = self.inner.memory.peek(key.as_str()) {
            return TaskHandle::ready(Resolved::Asset(asset));
        }

        let cache = self.clone();
        let submitted = self
            .inner
            .dispatcher
            .submit(PoolName::ImageFetch, move || cache.get(key.as_str(), hint));

        submitted.unwrap_or_else(|err| {
            warn!(url, error = %err, "cannot dispatch asset load");
            TaskHandle::ready(Resolved::placeholder(PlaceholderKind::NetworkError, hint))
        })
    }

    /// Returns the asset for `url` if it is in memory. Never touches disk or the origin.
    #[must_use]
    pub fn peek(&self, url: &str) -> Option<A> {
        self.inner.memory.peek(url)
    }

    /// Forgets `url` in memory and on disk, so the next lookup goes back to the origin.
    ///
    /// Invalidating an absent key does nothing.
    ///
    /// A load of `url` that is already in flight is not interrupted: when it finishes, its
    /// result is stored in memory and its download may be written to disk again. Only
    /// lookups that start after `invalidate` returns are guaranteed to miss.
    pub fn invalidate(&self, url: &str) {
        self.inner.memory.invalidate(url);

        let (Some(disk), Ok(key)) = (&self.inner.disk, CacheKey::parse(url)) else {
            return;
        };

        match disk.remove(&key) {
            Ok(true) => debug!(key = %key, "disk record removed"),
            Ok(false) => {}
            Err(err) => warn!(key = %key, error = %err, "failed to remove disk record"),
        }
    }

    /// Empties memory and deletes every file in the disk root.
    pub fn clear(&self) -> ClearSummary {
        self.inner.memory.clear();

        let summary = self.inner.disk.as_ref().map(DiskStore::clear).unwrap_or_default();
        info!(
            files_removed = summary.files_removed,
            files_failed = summary.files_failed,
            "cache cleared"
        );
        summary
    }

    /// A snapshot of memory and disk usage.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let memory_count = self.inner.memory.len();

        let Some(disk) = &self.inner.disk else {
            return CacheStats {
                memory_count,
                ..CacheStats::default()
            };
        };

        let usage = disk.usage().unwrap_or_else(|err| {
            warn!(root = %disk.root().display(), error = %err, "cannot measure disk tier");
            Default::default()
        });

        CacheStats {
            memory_count,
            disk_bytes: usage.bytes,
            disk_records: usage.records,
            disk_enabled: true,
        }
    }

    /// The disk tier, unless it is disabled.
    #[must_use]
    pub fn disk(&self) -> Option<&DiskStore> {
        self.inner.disk.as_ref()
    }

    /// The configuration this cache was created with.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn parse(url: &str) -> Result<CacheKey, PlaceholderKind> {
        CacheKey::parse(url).map_err(|err| match err {
            KeyError::Empty => PlaceholderKind::NoCover,
            KeyError::Invalid => {
                warn!(url, "rejecting key that is not an http(s) URL");
                PlaceholderKind::Invalid
            }
        })
    }
}

impl<A> Inner<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Runs at most once at a time per key, under the memory tier's guard.
    fn load(&self, key: &CacheKey) -> Result<A, LoadError> {
        if let Some(asset) = self.load_from_disk(key) {
            return Ok(asset);
        }

        debug!(key = %key, "cache miss, fetching from origin");
        let bytes = self.origin.fetch(key.as_str())?;

        let asset = match validate(&bytes, self.config.min_valid_bytes(), self.decoder.as_ref()) {
            Validation::Valid(asset) => asset,
            Validation::Corrupt(corruption) => {
                warn!(key = %key, %corruption, "origin sent unusable bytes");
                return Err(LoadError::Corrupt(corruption));
            }
        };

        if let Some(disk) = &self.disk
            && let Err(err) = disk.write(key, &bytes)
        {
            warn!(key = %key, error = %err, "failed to persist asset");
        }

        Ok(asset)
    }

    fn load_from_disk(&self, key: &CacheKey) -> Option<A> {
        let disk = self.disk.as_ref()?;

        let bytes = match disk.read(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to read disk record");
                return None;
            }
        };

        match validate(&bytes, self.config.min_valid_bytes(), self.decoder.as_ref()) {
            Validation::Valid(asset) => {
                debug!(key = %key, "disk hit");
                Some(asset)
            }
            Validation::Corrupt(corruption) => {
                warn!(key = %key, %corruption, "discarding corrupt disk record");
                if let Err(err) = disk.remove(key) {
                    warn!(key = %key, error = %err, "failed to remove corrupt disk record");
                }
                None
            }
        }
    }
}

impl<A> Clone for TieredCache<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Debug for TieredCache<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.inner.config)
            .field("memory", &self.inner.memory)
            .field("disk", &self.inner.disk)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bytes::Bytes;
    use task_dispatch::DispatcherConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{BytesDecoder, ScriptedOrigin};

    const URL: &str = "https://example.com/covers/1.jpg";
    const HINT: PlaceholderHint = PlaceholderHint::new(100, 150);

    struct Fixture {
        _dir: TempDir,
        origin: Arc<ScriptedOrigin>,
        decoder: Arc<BytesDecoder>,
        cache: TieredCache<Bytes>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let origin = Arc::new(ScriptedOrigin::new());
        let decoder = Arc::new(BytesDecoder::with_magic(&b"IMG"[..]));
        let dispatcher = Arc::new(TaskDispatcher::new(DispatcherConfig::default()).unwrap());

        let config = CacheConfig::default().with_disk_root(dir.path().join("cache"));
        let cache = TieredCache::new(
            config,
            Arc::clone(&origin) as Arc<dyn Origin>,
            Arc::clone(&decoder) as Arc<dyn AssetDecoder<Asset = Bytes>>,
            dispatcher,
        );

        Fixture {
            _dir: dir,
            origin,
            decoder,
            cache,
        }
    }

    #[test]
    fn miss_fetches_and_persists() {
        let f = fixture();
        let payload = f.decoder.valid_payload(2048);
        f.origin.respond(URL, payload.clone());

        assert_eq!(f.cache.get(URL, HINT), Resolved::Asset(payload.clone()));

        let key = CacheKey::parse(URL).unwrap();
        assert_eq!(fs::read(f.cache.disk().unwrap().path_for(&key)).unwrap(), payload);
        assert_eq!(f.origin.calls(URL), 1);
    }

    #[test]
    fn second_get_is_a_memory_hit() {
        let f = fixture();
        f.origin.respond(URL, f.decoder.valid_payload(2048));

        let first = f.cache.get(URL, HINT);
        let decodes = f.decoder.decodes();
        let second = f.cache.get(URL, HINT);

        assert_eq!(first, second);
        assert_eq!(f.decoder.decodes(), decodes);
        assert_eq!(f.origin.calls(URL), 1);
    }

    #[test]
    fn disk_record_survives_memory_loss() {
        let f = fixture();
        let payload = f.decoder.valid_payload(4096);
        f.origin.respond(URL, payload.clone());
        _ = f.cache.get(URL, HINT);

        // A fresh cache on the same directory has an empty memory tier.
        let reopened = TieredCache::new(
            f.cache.config().clone(),
            Arc::clone(&f.origin) as Arc<dyn Origin>,
            Arc::clone(&f.decoder) as Arc<dyn AssetDecoder<Asset = Bytes>>,
            Arc::new(TaskDispatcher::new(DispatcherConfig::default()).unwrap()),
        );

        assert_eq!(reopened.get(URL, HINT), Resolved::Asset(payload));
        assert_eq!(f.origin.calls(URL), 1);
    }

    #[test]
    fn failed_fetch_is_retried() {
        let f = fixture();
        f.origin.fail_unavailable(URL, "connection reset");

        assert_eq!(f.cache.get(URL, HINT).placeholder_kind(), Some(PlaceholderKind::NetworkError));
        assert_eq!(f.cache.peek(URL), None);

        f.origin.respond(URL, f.decoder.valid_payload(2048));
        assert!(f.cache.get(URL, HINT).is_asset());
        assert_eq!(f.origin.calls(URL), 2);
    }

    #[test]
    fn undecodable_download_leaves_no_file() {
        let f = fixture();
        f.origin.respond(URL, Bytes::from(vec![0_u8; 4096]));

        assert_eq!(f.cache.get(URL, HINT).placeholder_kind(), Some(PlaceholderKind::NetworkError));
        assert_eq!(f.cache.stats().disk_records, 0);
    }

    #[test]
    fn stats_without_disk_tier() {
        let dispatcher = Arc::new(TaskDispatcher::new(DispatcherConfig::default()).unwrap());
        let origin = Arc::new(ScriptedOrigin::new());
        origin.respond(URL, BytesDecoder::new().valid_payload(2048));

        let cache: TieredCache<Bytes> =
            TieredCache::new(CacheConfig::default(), origin, Arc::new(BytesDecoder::new()), dispatcher);

        assert!(cache.get(URL, HINT).is_asset());
        assert_eq!(
            cache.stats(),
            CacheStats {
                memory_count: 1,
                disk_bytes: 0,
                disk_records: 0,
                disk_enabled: false,
            }
        );
    }
}

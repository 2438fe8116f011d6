//! In-memory response cache.
//!
//! Two disjoint namespaces, one for fetched objects and one for folder
//! listings, each backed by a [`DashMap`]. Entries carry an optional expiry;
//! reading an expired entry is a miss. In immutable-tree mode entries never
//! expire by time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ConfigError;
use crate::store::{Listing, StoredObject};

/// How long cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Nothing is cached.
    Disabled,
    /// Entries expire after the given duration.
    Ttl(Duration),
    /// The bucket never changes; entries live for the whole process.
    ImmutableTree,
}

/// Which `NotFound` results are cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMissPolicy {
    /// Only in immutable-tree mode, permanently.
    #[default]
    Immutable,
    /// In every caching mode, with the same lifetime as hits.
    Always,
    /// Never.
    Never,
}

impl FromStr for CacheMissPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immutable" => Ok(Self::Immutable),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            _ => Err(ConfigError::Invalid {
                name: "S3_CACHE_MISSES",
                value: s.to_owned(),
            }),
        }
    }
}

/// A cached object lookup: either the object or a recorded miss.
#[derive(Debug, Clone)]
pub enum ObjectLookup {
    /// The key exists.
    Found(Arc<StoredObject>),
    /// The key is known to be absent.
    Missing,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Response cache shared by all requests.
pub struct ResponseCache {
    mode: CacheMode,
    miss_policy: CacheMissPolicy,
    objects: DashMap<String, Entry<ObjectLookup>>,
    listings: DashMap<String, Entry<Arc<Listing>>>,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("mode", &self.mode)
            .field("miss_policy", &self.miss_policy)
            .field("objects", &self.objects.len())
            .field("listings", &self.listings.len())
            .finish()
    }
}

impl ResponseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(mode: CacheMode, miss_policy: CacheMissPolicy) -> Self {
        Self {
            mode,
            miss_policy,
            objects: DashMap::new(),
            listings: DashMap::new(),
        }
    }

    /// A cache that stores nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheMode::Disabled, CacheMissPolicy::Never)
    }

    /// The configured mode.
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Whether anything is ever stored.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.mode != CacheMode::Disabled
    }

    /// Look up a cached object result.
    #[must_use]
    pub fn get_object(&self, key: &str) -> Option<ObjectLookup> {
        get_live(&self.objects, key)
    }

    /// Record a fetched object.
    pub fn put_object(&self, key: &str, object: Arc<StoredObject>) {
        if let Some(expires_at) = self.expiry() {
            self.objects.insert(
                key.to_owned(),
                Entry {
                    value: ObjectLookup::Found(object),
                    expires_at,
                },
            );
        }
    }

    /// Record that a key does not exist, if the miss policy allows it.
    pub fn put_missing(&self, key: &str) {
        if !self.caches_misses() {
            return;
        }
        if let Some(expires_at) = self.expiry() {
            self.objects.insert(
                key.to_owned(),
                Entry {
                    value: ObjectLookup::Missing,
                    expires_at,
                },
            );
        }
    }

    /// Look up a cached listing.
    #[must_use]
    pub fn get_listing(&self, prefix: &str) -> Option<Arc<Listing>> {
        get_live(&self.listings, prefix)
    }

    /// Record a successful listing.
    pub fn put_listing(&self, prefix: &str, listing: Arc<Listing>) {
        if let Some(expires_at) = self.expiry() {
            self.listings.insert(
                prefix.to_owned(),
                Entry {
                    value: listing,
                    expires_at,
                },
            );
        }
    }

    /// Drop every expired entry. Returns the number of removed entries.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.len();
        self.objects.retain(|_, entry| entry.is_live(now));
        self.listings.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.len())
    }

    /// Number of entries across both namespaces, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len() + self.listings.len()
    }

    /// Whether both namespaces are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.listings.is_empty()
    }

    /// `None` when nothing may be stored, otherwise the expiry to attach.
    fn expiry(&self) -> Option<Option<Instant>> {
        match self.mode {
            CacheMode::Disabled => None,
            CacheMode::Ttl(ttl) => Some(Some(Instant::now() + ttl)),
            CacheMode::ImmutableTree => Some(None),
        }
    }

    fn caches_misses(&self) -> bool {
        match (self.miss_policy, self.mode) {
            (_, CacheMode::Disabled) | (CacheMissPolicy::Never, _) => false,
            (CacheMissPolicy::Always, _) => true,
            (CacheMissPolicy::Immutable, mode) => mode == CacheMode::ImmutableTree,
        }
    }
}

fn get_live<V: Clone>(map: &DashMap<String, Entry<V>>, key: &str) -> Option<V> {
    let entry = map.get(key)?;
    entry.is_live(Instant::now()).then(|| entry.value.clone())
}

/// Spawn the periodic expired-entry sweeper.
///
/// Returns `None` unless the cache runs in TTL mode.
pub fn spawn_sweeper(cache: Arc<ResponseCache>, interval: Duration) -> Option<JoinHandle<()>> {
    if !matches!(cache.mode(), CacheMode::Ttl(_)) {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let removed = cache.sweep();
            debug!(removed, remaining = cache.len(), "swept expired cache entries");
        }
    }))
}

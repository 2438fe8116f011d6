//! In-memory [`ObjectStore`].
//!
//! Keeps objects in a sorted map and answers listings with the same
//! delimiter grouping and pagination contract as S3 `ListObjectsV2`, so the
//! engine can be exercised without a bucket. Call counters and error
//! injection make cache and failure behaviour observable in tests.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::{ListObjectsPage, ListObjectsRequest, ObjectStore, StoreFuture, StoredObject};

/// Maximum number of entries per page, as in S3.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Object store backed by a `BTreeMap`.
///
/// ```
/// use ruststack_web_core::MemoryObjectStore;
/// use ruststack_web_core::store::{ObjectStore, list_prefix};
///
/// # tokio_test::block_on(async {
/// let store = MemoryObjectStore::with_page_size(1);
/// store.put("docs/index.html", "<h1>docs</h1>", "text/html");
/// store.put("docs/img/logo.png", "png", "image/png");
///
/// let object = store.fetch_object("docs/index.html").await.unwrap();
/// assert_eq!(object.body.as_ref(), b"<h1>docs</h1>");
///
/// let listing = list_prefix(&store, "docs").await.unwrap();
/// assert_eq!(listing.files, vec!["docs/index.html"]);
/// assert_eq!(listing.folders, vec!["docs/img/"]);
/// assert_eq!(store.list_calls(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
    failing_keys: RwLock<HashSet<String>>,
    failing_prefixes: RwLock<HashSet<String>>,
    fetch_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// Create an empty store with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty store returning at most `page_size` entries per listing page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            failing_keys: RwLock::new(HashSet::new()),
            failing_prefixes: RwLock::new(HashSet::new()),
            fetch_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Store an object, replacing any previous one.
    pub fn insert(&self, key: impl Into<String>, object: StoredObject) {
        self.objects.write().insert(key.into(), object);
    }

    /// Store a body with a content type.
    pub fn put(&self, key: impl Into<String>, body: impl Into<Bytes>, content_type: &str) {
        self.insert(key, StoredObject::new(body, content_type));
    }

    /// Remove an object.
    pub fn remove(&self, key: &str) -> Option<StoredObject> {
        self.objects.write().remove(key)
    }

    /// Make every fetch of `key` fail with a non-`NotFound` error.
    pub fn fail_fetch(&self, key: impl Into<String>) {
        self.failing_keys.write().insert(key.into());
    }

    /// Make every listing of `prefix` fail with a non-`NotFound` error.
    pub fn fail_list(&self, prefix: impl Into<String>) {
        self.failing_prefixes.write().insert(prefix.into());
    }

    /// Number of `fetch_object` calls so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    /// Number of `list_objects` calls so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    fn fetch(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_keys.read().contains(key) {
            return Err(StoreError::other("GetObject", key, "injected failure"));
        }
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }

    fn list(&self, request: &ListObjectsRequest<'_>) -> Result<ListObjectsPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_prefixes.read().contains(request.prefix) {
            return Err(StoreError::other("ListObjectsV2", request.prefix, "injected failure"));
        }

        let marker = request
            .continuation_token
            .map(decode_continuation_token)
            .transpose()?;
        let lower = match (marker.as_deref(), request.start_after) {
            (Some(m), _) | (None, Some(m)) => Bound::Excluded(m),
            (None, None) => Bound::Unbounded,
        };

        let objects = self.objects.read();
        let mut page = ListObjectsPage::default();
        let mut last_item: Option<String> = None;

        for key in objects.range::<str, _>((lower, Bound::Unbounded)).map(|(k, _)| k) {
            if !key.starts_with(request.prefix) {
                if key.as_str() > request.prefix {
                    break;
                }
                continue;
            }

            let (item, is_prefix) = group_key(key, request.prefix, request.delimiter);
            if marker.as_deref().is_some_and(|m| item.as_str() <= m) || last_item.as_ref() == Some(&item) {
                continue;
            }

            if page.keys.len() + page.common_prefixes.len() >= self.page_size {
                page.is_truncated = true;
                page.next_continuation_token = last_item.as_deref().map(encode_continuation_token);
                break;
            }

            if is_prefix {
                page.common_prefixes.push(item.clone());
            } else {
                page.keys.push(item.clone());
            }
            last_item = Some(item);
        }

        Ok(page)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn fetch_object<'a>(&'a self, key: &'a str) -> StoreFuture<'a, StoredObject> {
        Box::pin(async move { self.fetch(key) })
    }

    fn list_objects<'a>(&'a self, request: ListObjectsRequest<'a>) -> StoreFuture<'a, ListObjectsPage> {
        Box::pin(async move { self.list(&request) })
    }
}

/// The listing entry a key contributes: the key itself, or the common prefix
/// it falls under.
fn group_key(key: &str, prefix: &str, delimiter: &str) -> (String, bool) {
    let after_prefix = &key[prefix.len()..];
    if !delimiter.is_empty() {
        if let Some(pos) = after_prefix.find(delimiter) {
            return (format!("{prefix}{}{delimiter}", &after_prefix[..pos]), true);
        }
    }
    (key.to_owned(), false)
}

/// Encode the last returned entry as an opaque continuation token.
#[must_use]
pub fn encode_continuation_token(key: &str) -> String {
    BASE64_STANDARD.encode(key.as_bytes())
}

/// Decode a continuation token produced by [`encode_continuation_token`].
pub fn decode_continuation_token(token: &str) -> Result<String, StoreError> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|e| StoreError::other("ListObjectsV2", token, e))?;
    String::from_utf8(bytes).map_err(|e| StoreError::other("ListObjectsV2", token, e))
}

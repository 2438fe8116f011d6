//! Object store abstraction and listing merge.
//!
//! [`ObjectStore`] is the boundary between the resolution engine and the
//! backing bucket. Implementations only need to fetch one object and return
//! one listing page; [`list_prefix`] drives the pagination and produces the
//! sorted [`Listing`] the engine works with.
//!
//! # Object Safety
//!
//! Methods return boxed futures so the engine can hold an
//! `Arc<dyn ObjectStore>`.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderName, HeaderValue, LAST_MODIFIED};
use serde::Serialize;

use crate::error::StoreError;

/// Delimiter used to group keys into folders.
pub const DELIMITER: &str = "/";

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Metadata forwarded to the client alongside an object body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Size of the object in bytes.
    pub content_length: Option<u64>,
    /// HTTP-date of the last modification.
    pub last_modified: Option<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Content encoding the object was stored with.
    pub content_encoding: Option<String>,
    /// Lifecycle expiration information.
    pub expiration: Option<String>,
}

/// A fetched object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub body: Bytes,
    /// Content type recorded for the object.
    pub content_type: Option<String>,
    /// Forwarded metadata.
    pub metadata: ObjectMetadata,
}

impl StoredObject {
    /// Create an object with a body and a content type.
    #[must_use]
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            metadata: ObjectMetadata {
                content_length: Some(body.len() as u64),
                ..ObjectMetadata::default()
            },
            body,
            content_type: Some(content_type.into()),
        }
    }

    /// Response headers carried by this object: content type and metadata.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut put = |name: HeaderName, value: Option<&str>| {
            if let Some(hv) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(name, hv);
            }
        };

        put(CONTENT_TYPE, self.content_type.as_deref());
        put(
            CONTENT_LENGTH,
            self.metadata.content_length.map(|l| l.to_string()).as_deref(),
        );
        put(LAST_MODIFIED, self.metadata.last_modified.as_deref());
        put(ETAG, self.metadata.etag.as_deref());
        put(CONTENT_ENCODING, self.metadata.content_encoding.as_deref());
        put(
            HeaderName::from_static("expiration"),
            self.metadata.expiration.as_deref(),
        );
        headers
    }
}

/// Parameters of a single delimiter-based listing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListObjectsRequest<'a> {
    /// Key prefix to list.
    pub prefix: &'a str,
    /// Grouping delimiter.
    pub delimiter: &'a str,
    /// Token returned by the previous page.
    pub continuation_token: Option<&'a str>,
    /// Only keys strictly after this one are returned.
    pub start_after: Option<&'a str>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsPage {
    /// Object keys directly under the prefix.
    pub keys: Vec<String>,
    /// Common prefixes (folders) directly under the prefix.
    pub common_prefixes: Vec<String>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Token for the next page.
    pub next_continuation_token: Option<String>,
}

/// Merged, sorted content of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Object keys, ascending.
    pub files: Vec<String>,
    /// Folder keys (ending with `/`), ascending.
    pub folders: Vec<String>,
}

impl Listing {
    /// Whether the folder has neither files nor sub-folders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

/// Backing object store.
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch a single object.
    ///
    /// Must return [`StoreError::NotFound`] when the key is absent.
    fn fetch_object<'a>(&'a self, key: &'a str) -> StoreFuture<'a, StoredObject>;

    /// Fetch one page of a delimiter-based listing.
    fn list_objects<'a>(&'a self, request: ListObjectsRequest<'a>) -> StoreFuture<'a, ListObjectsPage>;
}

/// Normalize a folder key into a listing prefix: the root stays empty, any
/// other prefix ends with exactly one `/`.
#[must_use]
pub fn listing_prefix(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// List every file and folder directly under `prefix`, following pagination.
///
/// The first page is requested with `start_after = prefix` so a folder marker
/// object is not reported as a file. A failing page aborts the whole listing.
/// The merged files and folders are sorted and deduplicated, so the result
/// does not depend on where the store cut its pages.
pub async fn list_prefix<S>(store: &S, prefix: &str) -> Result<Listing, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let prefix = listing_prefix(prefix);
    let mut listing = Listing::default();
    let mut continuation_token: Option<String> = None;

    loop {
        let request = ListObjectsRequest {
            prefix: &prefix,
            delimiter: DELIMITER,
            continuation_token: continuation_token.as_deref(),
            start_after: if continuation_token.is_none() && !prefix.is_empty() {
                Some(prefix.as_str())
            } else {
                None
            },
        };
        let page = store.list_objects(request).await?;

        listing.files.extend(page.keys);
        listing.folders.extend(page.common_prefixes);

        if !page.is_truncated {
            break;
        }
        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => {
                return Err(StoreError::other(
                    "ListObjectsV2",
                    prefix,
                    "truncated listing page without a continuation token",
                ));
            }
        }
    }

    listing.files.sort_unstable();
    listing.files.dedup();
    listing.folders.sort_unstable();
    listing.folders.dedup();
    Ok(listing)
}

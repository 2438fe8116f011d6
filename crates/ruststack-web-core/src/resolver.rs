//! Key resolution engine.
//!
//! Turns a canonical request into a response by walking a small state
//! machine over the bucket:
//!
//! ```text
//!   Directory(key) ──index found──▶ File(index)
//!        │                              │
//!        └──empty / list error──┐       └──missing──┐
//!                               ▼                   ▼
//!                        File(default 404) ◀── File(key) ──missing──▶ Directory(key)
//! ```
//!
//! A fallback page never falls back again, so a request performs at most
//! three lookups.

use std::ops::ControlFlow;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use http::header::CACHE_CONTROL;
use http::{HeaderValue, StatusCode};
use quick_xml::escape::escape;
use regex::Regex;
use tracing::debug;

use crate::cache::{ObjectLookup, ResponseCache};
use crate::cache_control::CacheControlPolicy;
use crate::config::WebConfig;
use crate::error::StoreError;
use crate::path::{PathResolution, PathResolver};
use crate::response::WebResponse;
use crate::sink::{EventSink, LogEvent, StoreLog, StoreLogLevel};
use crate::store::{Listing, ObjectStore, StoredObject, list_prefix, listing_prefix};

static GATSBY_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<script>window\.location\.href="(.+)"</script>$"#)
        .expect("gatsby redirect pattern is valid")
});

/// An inbound request, reduced to what resolution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    /// Raw request path, possibly escaped.
    pub path: String,
    /// Value of the `Accept` header.
    pub accept: Option<String>,
}

impl WebRequest {
    /// A request for `path` without an `Accept` header.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            accept: None,
        }
    }

    /// Set the `Accept` header value.
    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Whether the client asked for an HTML page rather than JSON: the
    /// `Accept` header lists `text/html` and does not list `application/json`.
    #[must_use]
    pub fn prefers_html(&self) -> bool {
        let Some(accept) = self.accept.as_deref() else {
            return false;
        };
        let lists = |wanted: &str| {
            accept.split(',').any(|item| {
                let media = item.split(';').next().unwrap_or_default().trim();
                media.eq_ignore_ascii_case(wanted)
            })
        };
        lists("text/html") && !lists("application/json")
    }
}

/// Which configured fallback page a file is being served as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPage {
    /// The default 404 page.
    NotFound,
    /// The default 403 page.
    Forbidden,
}

impl FallbackPage {
    /// Status the page is served with.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

/// One state of the resolution walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Resolve `key` as a folder.
    Directory {
        /// Folder key.
        key: String,
    },
    /// Resolve `key` as a file.
    File {
        /// File key.
        key: String,
        /// Retry as a folder when the key does not exist.
        directory_fallback: bool,
        /// Set when the file is a configured fallback page.
        fallback: Option<FallbackPage>,
    },
}

/// Settings the engine reads on every request.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Path to key mapping.
    pub paths: PathResolver,
    /// Index file name served for folders.
    pub index_file_name: String,
    /// Store key of the default 404 page.
    pub default_404_key: Option<String>,
    /// Store key of the default 403 page.
    pub default_403_key: Option<String>,
    /// Whether folders without index are listed.
    pub enable_directory_listing: bool,
    /// Whether gatsby redirect pages become 301s.
    pub handle_gatsby_redirects: bool,
    /// Cache-control header policy.
    pub cache_control: CacheControlPolicy,
    /// Which store calls are logged.
    pub store_log_level: StoreLogLevel,
}

impl From<&WebConfig> for ResolverSettings {
    fn from(config: &WebConfig) -> Self {
        Self {
            paths: PathResolver::new(config.folder_prefix()),
            index_file_name: config.folder_index_file_name.clone(),
            default_404_key: config.default_404_key(),
            default_403_key: config.default_403_key(),
            enable_directory_listing: config.enable_directory_listing,
            handle_gatsby_redirects: config.handle_gatsby_redirects,
            cache_control: CacheControlPolicy::new(
                &config.cache_control_regexp_list,
                &config.cache_control_regexp_blacklist,
                config.cache_control_max_age,
            ),
            store_log_level: config.s3_log_level,
        }
    }
}

/// Resolves requests against an object store through the response cache.
pub struct Resolver {
    settings: ResolverSettings,
    store: Arc<dyn ObjectStore>,
    cache: Arc<ResponseCache>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        settings: ResolverSettings,
        store: Arc<dyn ObjectStore>,
        cache: Arc<ResponseCache>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            settings,
            store,
            cache,
            sink,
        }
    }

    /// The engine settings.
    #[must_use]
    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// The response cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Resolve one request.
    pub async fn resolve(&self, request: &WebRequest) -> WebResponse {
        let target = match self.settings.paths.resolve(&request.path) {
            PathResolution::Redirect { location } => {
                debug!(path = %request.path, %location, "redirecting to canonical path");
                return WebResponse::moved_permanently(&location);
            }
            PathResolution::Resolve(target) => target,
        };

        let mut step = if target.directory {
            Step::Directory { key: target.key }
        } else {
            Step::File {
                key: target.key,
                directory_fallback: target.directory_fallback,
                fallback: None,
            }
        };

        loop {
            let flow = match step {
                Step::Directory { key } => self.resolve_directory(&key, request).await,
                Step::File {
                    key,
                    directory_fallback,
                    fallback,
                } => {
                    self.resolve_file(&key, &target.request_path, directory_fallback, fallback)
                        .await
                }
            };
            match flow {
                ControlFlow::Continue(next) => step = next,
                ControlFlow::Break(response) => return response,
            }
        }
    }

    async fn resolve_directory(&self, key: &str, request: &WebRequest) -> ControlFlow<WebResponse, Step> {
        let listing = match self.list(key).await {
            Ok(listing) => listing,
            Err(_) => return self.not_found_or(StatusCode::INTERNAL_SERVER_ERROR),
        };

        if let Some(index) = listing.files.iter().find(|file| self.is_index_file(file)) {
            return ControlFlow::Continue(Step::File {
                key: index.clone(),
                directory_fallback: false,
                fallback: None,
            });
        }

        if listing.is_empty() {
            return self.not_found_or(StatusCode::NOT_FOUND);
        }

        if self.settings.enable_directory_listing {
            if request.prefers_html() {
                let page = folder_html(self.settings.paths.folder_prefix(), key, &listing);
                return ControlFlow::Break(WebResponse::html(page));
            }
            return ControlFlow::Break(match serde_json::to_vec(listing.as_ref()) {
                Ok(body) => WebResponse::json(body),
                Err(_) => WebResponse::empty(StatusCode::INTERNAL_SERVER_ERROR),
            });
        }

        match &self.settings.default_403_key {
            Some(page) => ControlFlow::Continue(Step::File {
                key: page.clone(),
                directory_fallback: false,
                fallback: Some(FallbackPage::Forbidden),
            }),
            None => ControlFlow::Break(WebResponse::empty(StatusCode::FORBIDDEN)),
        }
    }

    async fn resolve_file(
        &self,
        key: &str,
        request_path: &str,
        directory_fallback: bool,
        fallback: Option<FallbackPage>,
    ) -> ControlFlow<WebResponse, Step> {
        let object = match self.fetch(key).await {
            Ok(object) => object,
            Err(StoreError::NotFound { .. }) => {
                if directory_fallback {
                    return ControlFlow::Continue(Step::Directory { key: key.to_owned() });
                }
                return match (&self.settings.default_404_key, fallback) {
                    (Some(page), None) if page != key => ControlFlow::Continue(Step::File {
                        key: page.clone(),
                        directory_fallback: false,
                        fallback: Some(FallbackPage::NotFound),
                    }),
                    _ => ControlFlow::Break(WebResponse::empty(
                        fallback.map_or(StatusCode::NOT_FOUND, FallbackPage::status),
                    )),
                };
            }
            Err(StoreError::Other { .. }) => {
                return ControlFlow::Break(WebResponse::empty(
                    fallback.map_or(StatusCode::INTERNAL_SERVER_ERROR, FallbackPage::status),
                ));
            }
        };

        if self.settings.handle_gatsby_redirects && self.is_index_file(key) {
            if let Some(location) = gatsby_redirect_target(&object.body) {
                return ControlFlow::Break(WebResponse::moved_permanently(location));
            }
        }

        let page = fallback.or_else(|| self.fallback_page_for(key));
        let mut headers = object.headers();
        let cache_control = self.settings.cache_control.decide(request_path, page.is_some());
        if let Ok(value) = HeaderValue::from_str(cache_control) {
            headers.insert(CACHE_CONTROL, value);
        }

        ControlFlow::Break(WebResponse {
            status: page.map_or(StatusCode::OK, FallbackPage::status),
            headers,
            body: object.body.clone(),
        })
    }

    /// Continue with the default 404 page if one is configured, otherwise
    /// stop with an empty `status`.
    fn not_found_or(&self, status: StatusCode) -> ControlFlow<WebResponse, Step> {
        match &self.settings.default_404_key {
            Some(page) => ControlFlow::Continue(Step::File {
                key: page.clone(),
                directory_fallback: false,
                fallback: Some(FallbackPage::NotFound),
            }),
            None => ControlFlow::Break(WebResponse::empty(status)),
        }
    }

    fn is_index_file(&self, key: &str) -> bool {
        key.rsplit('/').next() == Some(self.settings.index_file_name.as_str())
    }

    fn fallback_page_for(&self, key: &str) -> Option<FallbackPage> {
        if self.settings.default_404_key.as_deref() == Some(key) {
            Some(FallbackPage::NotFound)
        } else if self.settings.default_403_key.as_deref() == Some(key) {
            Some(FallbackPage::Forbidden)
        } else {
            None
        }
    }

    async fn fetch(&self, key: &str) -> Result<Arc<StoredObject>, StoreError> {
        match self.cache.get_object(key) {
            Some(ObjectLookup::Found(object)) => return Ok(object),
            Some(ObjectLookup::Missing) => return Err(StoreError::not_found(key)),
            None => {}
        }

        let started = Instant::now();
        let result = self.store.fetch_object(key).await;
        self.record_store_call("GetObject", key, started, result.as_ref().err());

        match result {
            Ok(object) => {
                let object = Arc::new(object);
                self.cache.put_object(key, Arc::clone(&object));
                Ok(object)
            }
            Err(e) => {
                if e.is_not_found() {
                    self.cache.put_missing(key);
                }
                Err(e)
            }
        }
    }

    async fn list(&self, key: &str) -> Result<Arc<Listing>, StoreError> {
        let prefix = listing_prefix(key);
        if let Some(listing) = self.cache.get_listing(&prefix) {
            return Ok(listing);
        }

        let started = Instant::now();
        let result = list_prefix(self.store.as_ref(), &prefix).await;
        self.record_store_call("ListObjectsV2", &prefix, started, result.as_ref().err());

        let listing = Arc::new(result?);
        self.cache.put_listing(&prefix, Arc::clone(&listing));
        Ok(listing)
    }

    fn record_store_call(&self, operation: &'static str, key: &str, started: Instant, error: Option<&StoreError>) {
        // A missing key is an expected outcome of the fallback chain.
        let failed = error.is_some_and(|e| !e.is_not_found());
        if !self.settings.store_log_level.logs(failed) {
            return;
        }
        self.sink.emit(LogEvent::Store(StoreLog {
            operation,
            key: key.to_owned(),
            duration: started.elapsed(),
            error: error.map(ToString::to_string),
        }));
    }
}

/// Render a folder listing as a page of links, folders first.
///
/// Links are site paths: the folder prefix is stripped and a leading `/` added.
fn folder_html(folder_prefix: &str, key: &str, listing: &Listing) -> String {
    let site_path = |k: &str| format!("/{}", k.strip_prefix(folder_prefix).unwrap_or(k));
    let folder = site_path(&listing_prefix(key));

    let items: String = listing
        .folders
        .iter()
        .chain(&listing.files)
        .map(|child| {
            let path = site_path(child);
            let name = path
                .strip_prefix(folder.as_str())
                .unwrap_or(&path)
                .trim_start_matches('/');
            format!(r#"<li><a href="{}">{}</a></li>"#, escape(path.as_str()), escape(name))
        })
        .collect();

    let title = escape(folder.as_str());
    format!(
        "<html>\n<head>\n  <title>{title}</title>\n</head>\n<body>\n  <h1>{title}</h1>\n  <ul>{items}</ul>\n</body>\n</html>"
    )
}

/// Target of a gatsby client-side redirect page, if `body` is one.
fn gatsby_redirect_target(body: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(body).ok()?.trim_end();
    GATSBY_REDIRECT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

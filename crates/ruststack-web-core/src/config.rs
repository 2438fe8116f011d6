//! Web server configuration.
//!
//! Provides [`WebConfig`], loaded once at startup and treated as read-only for
//! the rest of the process lifetime. Values come from environment variables;
//! [`WebConfig::from_lookup`] takes an arbitrary lookup function so tests can
//! feed variables without touching the process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::cache::{CacheMissPolicy, CacheMode};
use crate::error::ConfigError;
use crate::path::clean_path;
use crate::sink::StoreLogLevel;

/// Lower bound applied to `S3_CACHE_TTL`.
pub const MIN_CACHE_TTL_SECS: u64 = 30;

/// Extra delay added to the TTL to obtain the sweeper interval.
pub const SWEEP_GRACE_SECS: u64 = 300;

/// Separator used by the cache-control pattern list variables.
const PATTERN_SEPARATOR: &str = "|||";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                value: s.to_owned(),
            }),
        }
    }
}

/// RustStack Web configuration.
///
/// # Examples
///
/// ```
/// use ruststack_web_core::WebConfig;
///
/// let config = WebConfig::builder().s3_bucket("site".into()).s3_region(Some("eu-west-1".into())).build();
/// assert_eq!(config.folder_index_file_name, "index.html");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct WebConfig {
    /// Bind address for the HTTP listener.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub gateway_listen: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Tracing output format.
    #[builder(default)]
    pub log_format: LogFormat,

    /// Whether a log event is emitted for every HTTP request.
    #[builder(default = true)]
    pub log_http_requests: bool,

    /// Capacity of the bounded log event queue.
    #[builder(default = 1024)]
    pub access_log_queue_size: usize,

    /// Path answered by the health endpoint instead of the bucket.
    #[builder(default = String::from("/_health"))]
    pub health_check_path: String,

    /// Take the client address from `X-Forwarded-For` instead of the peer.
    #[builder(default = false)]
    pub trust_proxy: bool,

    /// Bucket holding the site.
    #[builder(default)]
    pub s3_bucket: String,

    /// Folder inside the bucket used as the site root.
    #[builder(default)]
    pub s3_folder: String,

    /// Bucket region.
    #[builder(default)]
    pub s3_region: Option<String>,

    /// Custom endpoint for S3-compatible stores.
    #[builder(default)]
    pub s3_endpoint: Option<String>,

    /// Whether path-style addressing is forced.
    #[builder(default = false)]
    pub s3_force_path_style: bool,

    /// Static access key. The default provider chain is used when unset.
    #[builder(default)]
    pub aws_access_key_id: Option<String>,

    /// Static secret key.
    #[builder(default)]
    #[serde(skip_serializing)]
    pub aws_secret_access_key: Option<String>,

    /// Whether store responses are cached for `s3_cache_ttl_secs`.
    #[builder(default = true)]
    pub s3_cache_responses: bool,

    /// Cache TTL in seconds (raised to [`MIN_CACHE_TTL_SECS`]).
    #[builder(default = 60)]
    pub s3_cache_ttl_secs: u64,

    /// Whether the bucket content never changes, enabling permanent caching.
    #[builder(default = false)]
    pub s3_immutable_tree: bool,

    /// Which store misses are cached.
    #[builder(default)]
    pub s3_cache_misses: CacheMissPolicy,

    /// Level of the per-call store log events.
    #[builder(default)]
    pub s3_log_level: StoreLogLevel,

    /// Page served with status 404 when a key cannot be resolved.
    #[builder(default)]
    pub default_404_file: String,

    /// Page served with status 403 when a folder has no index and listing is disabled.
    #[builder(default)]
    pub default_403_file: String,

    /// File name served for folder requests.
    #[builder(default = String::from("index.html"))]
    pub folder_index_file_name: String,

    /// Whether folders without an index are listed as JSON.
    #[builder(default = false)]
    pub enable_directory_listing: bool,

    /// Whether gatsby client-side redirect pages are turned into 301s.
    #[builder(default = false)]
    pub handle_gatsby_redirects: bool,

    /// Request paths matching any of these patterns get an immutable cache-control.
    #[builder(default)]
    pub cache_control_regexp_list: Vec<String>,

    /// Request paths matching any of these patterns never get an immutable cache-control.
    #[builder(default)]
    pub cache_control_regexp_blacklist: Vec<String>,

    /// `max-age` of the immutable cache-control header, in seconds.
    #[builder(default = 63_072_000)]
    pub cache_control_max_age: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for WebConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebConfig")
            .field("gateway_listen", &self.gateway_listen)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("log_http_requests", &self.log_http_requests)
            .field("access_log_queue_size", &self.access_log_queue_size)
            .field("health_check_path", &self.health_check_path)
            .field("trust_proxy", &self.trust_proxy)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_folder", &self.s3_folder)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_force_path_style", &self.s3_force_path_style)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field(
                "aws_secret_access_key",
                &self.aws_secret_access_key.as_ref().map(|_| "..."),
            )
            .field("s3_cache_responses", &self.s3_cache_responses)
            .field("s3_cache_ttl_secs", &self.s3_cache_ttl_secs)
            .field("s3_immutable_tree", &self.s3_immutable_tree)
            .field("s3_cache_misses", &self.s3_cache_misses)
            .field("s3_log_level", &self.s3_log_level)
            .field("default_404_file", &self.default_404_file)
            .field("default_403_file", &self.default_403_file)
            .field("folder_index_file_name", &self.folder_index_file_name)
            .field("enable_directory_listing", &self.enable_directory_listing)
            .field("handle_gatsby_redirects", &self.handle_gatsby_redirects)
            .field("cache_control_regexp_list", &self.cache_control_regexp_list)
            .field(
                "cache_control_regexp_blacklist",
                &self.cache_control_regexp_blacklist,
            )
            .field("cache_control_max_age", &self.cache_control_max_age)
            .finish()
    }
}

impl WebConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    /// | `LOG_HTTP_REQUESTS` | `true` |
    /// | `ACCESS_LOG_QUEUE_SIZE` | `1024` |
    /// | `HEALTH_CHECK_PATH` | `/_health` |
    /// | `TRUST_PROXY` | `false` |
    /// | `S3_BUCKET` | *(required)* |
    /// | `S3_FOLDER` | *(empty)* |
    /// | `S3_REGION` | *(unset)* |
    /// | `S3_ENDPOINT` | *(unset)* |
    /// | `S3_FORCE_PATH_STYLE` | `false` |
    /// | `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` | *(unset)* |
    /// | `S3_CACHE_RESPONSES` | `true` |
    /// | `S3_CACHE_TTL` | `60` |
    /// | `S3_IMMUTABLE_TREE` | `false` |
    /// | `S3_CACHE_MISSES` | `immutable` |
    /// | `S3_LOG_LEVEL` | `error` |
    /// | `DEFAULT_404_FILE` | *(empty)* |
    /// | `DEFAULT_403_FILE` | *(empty)* |
    /// | `FOLDER_INDEX_FILE_NAME` | `index.html` |
    /// | `ENABLE_DIRECTORY_LISTING` | `false` |
    /// | `HANDLE_GATSBY_REDIRECTS` | `false` |
    /// | `CACHE_CONTROL_REGEXP_LIST` | *(empty)* |
    /// | `CACHE_CONTROL_REGEXP_BLACKLIST` | *(empty)* |
    /// | `CACHE_CONTROL_MAX_AGE` | `63072000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load and validate configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. Unparseable booleans and integers keep
    /// their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = var("LOG_FORMAT") {
            config.log_format = v.parse()?;
        }
        if let Some(v) = var("LOG_HTTP_REQUESTS").as_deref().and_then(parse_bool) {
            config.log_http_requests = v;
        }
        if let Some(v) = var("ACCESS_LOG_QUEUE_SIZE").and_then(|v| v.parse().ok()) {
            config.access_log_queue_size = v;
        }
        if let Some(v) = var("HEALTH_CHECK_PATH") {
            config.health_check_path = v;
        }
        if let Some(v) = var("TRUST_PROXY").as_deref().and_then(parse_bool) {
            config.trust_proxy = v;
        }
        if let Some(v) = var("S3_BUCKET") {
            config.s3_bucket = v;
        }
        if let Some(v) = var("S3_FOLDER") {
            config.s3_folder = v;
        }
        config.s3_region = var("S3_REGION");
        config.s3_endpoint = var("S3_ENDPOINT");
        if let Some(v) = var("S3_FORCE_PATH_STYLE").as_deref().and_then(parse_bool) {
            config.s3_force_path_style = v;
        }
        config.aws_access_key_id = var("AWS_ACCESS_KEY_ID");
        config.aws_secret_access_key = var("AWS_SECRET_ACCESS_KEY");
        if let Some(v) = var("S3_CACHE_RESPONSES").as_deref().and_then(parse_bool) {
            config.s3_cache_responses = v;
        }
        if let Some(v) = var("S3_CACHE_TTL").and_then(|v| v.parse().ok()) {
            config.s3_cache_ttl_secs = v;
        }
        if let Some(v) = var("S3_IMMUTABLE_TREE").as_deref().and_then(parse_bool) {
            config.s3_immutable_tree = v;
        }
        if let Some(v) = var("S3_CACHE_MISSES") {
            config.s3_cache_misses = v.parse()?;
        }
        if let Some(v) = var("S3_LOG_LEVEL") {
            config.s3_log_level = v.parse()?;
        }
        if let Some(v) = var("DEFAULT_404_FILE") {
            config.default_404_file = v;
        }
        if let Some(v) = var("DEFAULT_403_FILE") {
            config.default_403_file = v;
        }
        if let Some(v) = var("FOLDER_INDEX_FILE_NAME") {
            config.folder_index_file_name = v;
        }
        if let Some(v) = var("ENABLE_DIRECTORY_LISTING").as_deref().and_then(parse_bool) {
            config.enable_directory_listing = v;
        }
        if let Some(v) = var("HANDLE_GATSBY_REDIRECTS").as_deref().and_then(parse_bool) {
            config.handle_gatsby_redirects = v;
        }
        if let Some(v) = var("CACHE_CONTROL_REGEXP_LIST") {
            config.cache_control_regexp_list = split_patterns(&v);
        }
        if let Some(v) = var("CACHE_CONTROL_REGEXP_BLACKLIST") {
            config.cache_control_regexp_blacklist = split_patterns(&v);
        }
        if let Some(v) = var("CACHE_CONTROL_MAX_AGE").and_then(|v| v.parse().ok()) {
            config.cache_control_max_age = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would make the server unable to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_bucket.is_empty() {
            return Err(ConfigError::Missing("S3_BUCKET"));
        }
        if self.s3_region.is_none() && self.s3_endpoint.is_none() {
            return Err(ConfigError::MissingRegion);
        }
        if self.aws_access_key_id.is_some() != self.aws_secret_access_key.is_some() {
            return Err(ConfigError::PartialCredentials);
        }
        if self.folder_index_file_name.is_empty() || self.folder_index_file_name.contains('/') {
            return Err(ConfigError::Invalid {
                name: "FOLDER_INDEX_FILE_NAME",
                value: self.folder_index_file_name.clone(),
            });
        }
        if self.access_log_queue_size == 0 {
            return Err(ConfigError::Invalid {
                name: "ACCESS_LOG_QUEUE_SIZE",
                value: "0".to_owned(),
            });
        }
        if !self.health_check_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "HEALTH_CHECK_PATH",
                value: self.health_check_path.clone(),
            });
        }
        Ok(())
    }

    /// The key prefix of the site root: the cleaned folder followed by `/`,
    /// or the empty string when the site lives at the bucket root.
    #[must_use]
    pub fn folder_prefix(&self) -> String {
        let folder = relative_key(&self.s3_folder);
        if folder.is_empty() {
            folder
        } else {
            format!("{folder}/")
        }
    }

    /// Store key of the default 404 page, if configured.
    #[must_use]
    pub fn default_404_key(&self) -> Option<String> {
        self.page_key(&self.default_404_file)
    }

    /// Store key of the default 403 page, if configured.
    #[must_use]
    pub fn default_403_key(&self) -> Option<String> {
        self.page_key(&self.default_403_file)
    }

    /// Effective cache TTL.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.s3_cache_ttl_secs.max(MIN_CACHE_TTL_SECS))
    }

    /// Interval of the expired-entry sweeper.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.cache_ttl() + Duration::from_secs(SWEEP_GRACE_SECS)
    }

    /// Cache mode derived from the cache flags.
    ///
    /// Immutable-tree mode implies caching even when `S3_CACHE_RESPONSES` is off.
    #[must_use]
    pub fn cache_mode(&self) -> CacheMode {
        if self.s3_immutable_tree {
            CacheMode::ImmutableTree
        } else if self.s3_cache_responses {
            CacheMode::Ttl(self.cache_ttl())
        } else {
            CacheMode::Disabled
        }
    }

    fn page_key(&self, file: &str) -> Option<String> {
        let file = relative_key(file);
        if file.is_empty() {
            None
        } else {
            Some(format!("{}{file}", self.folder_prefix()))
        }
    }
}

/// Clean a configured path and strip its leading slash.
fn relative_key(path: &str) -> String {
    clean_path(&format!("/{path}"))
        .trim_start_matches('/')
        .to_owned()
}

/// Split a `|||`-separated pattern list, dropping blank entries.
fn split_patterns(value: &str) -> Vec<String> {
    value
        .split(PATTERN_SEPARATOR)
        .filter(|p| !p.trim().is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a boolean the way Go's `strconv.ParseBool` does.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

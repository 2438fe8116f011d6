//! Error types for the web core.
//!
//! Two families exist:
//!
//! - [`StoreError`] classifies every failed object-store call as either
//!   [`StoreError::NotFound`] (recovered locally by the fallback chain) or
//!   [`StoreError::Other`] (surfaced as a 500).
//! - [`ConfigError`] is returned by [`WebConfig::validate`](crate::WebConfig::validate)
//!   and is fatal at startup.

/// Boxed source error carried by [`StoreError::Other`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Object store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key does not exist in the bucket.
    #[error("The specified key does not exist: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// Any other failure: auth, network, throttling, malformed responses.
    #[error("{operation} failed for {key}: {source}")]
    Other {
        /// The store operation that failed (`GetObject`, `ListObjectsV2`, ...).
        operation: &'static str,
        /// The key or prefix the operation was issued for.
        key: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    /// Build a [`StoreError::NotFound`] for `key`.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Build a [`StoreError::Other`] from any error source.
    #[must_use]
    pub fn other(operation: &'static str, key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Other {
            operation,
            key: key.into(),
            source: source.into(),
        }
    }

    /// Whether this error means the key is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configuration error, fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// Neither a region nor a custom endpoint was configured.
    #[error("S3_REGION is mandatory when S3_ENDPOINT is not set")]
    MissingRegion,

    /// Only one half of a static credential pair was configured.
    #[error("AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together")]
    PartialCredentials,

    /// A setting holds a value that cannot be used.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// The environment variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

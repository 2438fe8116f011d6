//! `Cache-Control` header selection.

use regex::RegexSet;
use tracing::warn;

/// Header value for files that may change between deployments.
pub const MUTABLE_CACHE_CONTROL: &str = "public, no-cache";

/// Decides between the immutable and the mutable `Cache-Control` header for a
/// request path.
///
/// Patterns are compiled once; malformed ones are dropped with a warning and
/// never cause a request-time error.
#[derive(Debug, Clone)]
pub struct CacheControlPolicy {
    allow: RegexSet,
    deny: RegexSet,
    immutable_header: String,
}

impl CacheControlPolicy {
    /// Compile the allow and deny pattern lists.
    #[must_use]
    pub fn new<S: AsRef<str>>(allow: &[S], deny: &[S], max_age_secs: u64) -> Self {
        Self {
            allow: compile_patterns(allow, "allow"),
            deny: compile_patterns(deny, "deny"),
            immutable_header: format!("public, max-age={max_age_secs}, immutable"),
        }
    }

    /// Number of usable allow and deny patterns.
    #[must_use]
    pub fn pattern_counts(&self) -> (usize, usize) {
        (self.allow.len(), self.deny.len())
    }

    /// Pick the header for `path`.
    ///
    /// Fallback pages (default 404/403) always get the mutable header.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_web_core::cache_control::CacheControlPolicy;
    ///
    /// let policy = CacheControlPolicy::new(&[r"\.js$"], &[], 100);
    /// assert_eq!(policy.decide("/app.js", false), "public, max-age=100, immutable");
    /// assert_eq!(policy.decide("/app.js", true), "public, no-cache");
    /// assert_eq!(policy.decide("/index.html", false), "public, no-cache");
    /// ```
    #[must_use]
    pub fn decide(&self, path: &str, is_fallback_page: bool) -> &str {
        if !is_fallback_page && self.allow.is_match(path) && !self.deny.is_match(path) {
            &self.immutable_header
        } else {
            MUTABLE_CACHE_CONTROL
        }
    }
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S], kind: &str) -> RegexSet {
    let valid: Vec<&str> = patterns
        .iter()
        .map(AsRef::as_ref)
        .filter(|pattern| match regex::Regex::new(pattern) {
            Ok(_) => true,
            Err(e) => {
                warn!(pattern = %pattern, kind, error = %e, "dropping malformed cache-control pattern");
                false
            }
        })
        .collect();

    RegexSet::new(valid).unwrap_or_else(|_| RegexSet::empty())
}

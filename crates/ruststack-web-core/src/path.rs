//! Request path normalization and store key derivation.
//!
//! [`PathResolver`] turns a raw request path into either a canonical-path
//! redirect or a [`ResolveTarget`] describing which store key to look up and
//! how. Folder keys always end with `/`, file keys never do.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use quick_xml::escape::{resolve_html5_entity, unescape_with};

/// Characters escaped when a cleaned path is written into a `Location` header.
const LOCATION_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResolution {
    /// The path is not canonical; answer with a permanent redirect.
    Redirect {
        /// Percent-encoded canonical path.
        location: String,
    },
    /// The path is canonical; resolve it against the store.
    Resolve(ResolveTarget),
}

/// A canonical request mapped onto the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTarget {
    /// The decoded request path, used for the cache-control decision.
    pub request_path: String,
    /// The store key derived from the folder prefix and the path.
    pub key: String,
    /// The request explicitly addresses a folder (empty path or trailing slash).
    pub directory: bool,
    /// A file miss is retried as a folder lookup.
    pub directory_fallback: bool,
}

/// Maps request paths to store keys under a fixed folder prefix.
#[derive(Debug, Clone)]
pub struct PathResolver {
    folder_prefix: String,
}

impl PathResolver {
    /// Create a resolver for keys under `folder_prefix` (empty, or ending with `/`).
    #[must_use]
    pub fn new(folder_prefix: impl Into<String>) -> Self {
        Self {
            folder_prefix: folder_prefix.into(),
        }
    }

    /// The folder prefix keys are derived under.
    #[must_use]
    pub fn folder_prefix(&self) -> &str {
        &self.folder_prefix
    }

    /// Resolve a raw request path.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_web_core::path::{PathResolution, PathResolver};
    ///
    /// let resolver = PathResolver::new("site/");
    /// assert_eq!(
    ///     resolver.resolve("/docs/../app.js"),
    ///     PathResolution::Redirect { location: "/app.js".to_owned() },
    /// );
    /// let PathResolution::Resolve(target) = resolver.resolve("/docs/") else {
    ///     panic!("canonical path");
    /// };
    /// assert_eq!(target.key, "site/docs/");
    /// assert!(target.directory);
    /// ```
    #[must_use]
    pub fn resolve(&self, raw_path: &str) -> PathResolution {
        let decoded = unescape_path(raw_path);
        let original: Cow<'_, str> = if decoded.starts_with('/') {
            Cow::Borrowed(decoded.as_str())
        } else {
            Cow::Owned(format!("/{decoded}"))
        };

        let has_trailing_slash = original.ends_with('/');
        let cleaned = clean_path(&original);

        if needs_redirect(&original, &cleaned) {
            let target = if has_trailing_slash && cleaned != "/" {
                format!("{cleaned}/")
            } else {
                cleaned
            };
            return PathResolution::Redirect {
                location: utf8_percent_encode(&target, LOCATION_ENCODE_SET).to_string(),
            };
        }

        let relative = cleaned.trim_start_matches('/');
        let directory = relative.is_empty() || has_trailing_slash;
        let key = if directory && !relative.is_empty() {
            format!("{}{relative}/", self.folder_prefix)
        } else {
            format!("{}{relative}", self.folder_prefix)
        };

        PathResolution::Resolve(ResolveTarget {
            request_path: original.into_owned(),
            key,
            directory,
            directory_fallback: !directory,
        })
    }
}

/// Whether `original` differs from `cleaned` beyond a single trailing slash.
fn needs_redirect(original: &str, cleaned: &str) -> bool {
    original != cleaned && original.strip_suffix('/') != Some(cleaned)
}

/// Percent-decode, then HTML-unescape a request path.
///
/// Invalid UTF-8 after percent decoding is replaced lossily. Character
/// references are decoded one by one against the HTML5 entity table; one that
/// does not resolve stays in the text as written.
///
/// # Examples
///
/// ```
/// use ruststack_web_core::path::unescape_path;
///
/// assert_eq!(unescape_path("/caf&eacute;%20menu.html"), "/café menu.html");
/// assert_eq!(unescape_path("/a&amp;b&c.html"), "/a&b&c.html");
/// ```
#[must_use]
pub fn unescape_path(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    unescape_html(&decoded).into_owned()
}

fn unescape_html(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let reference = tail
            .find(';')
            .map(|end| &tail[..=end])
            .filter(|r| r.len() > 2 && !r[1..].contains('&'));
        match reference.and_then(|r| unescape_with(r, resolve_html5_entity).ok()) {
            Some(decoded) => {
                out.push_str(&decoded);
                rest = &tail[reference.map_or(1, str::len)..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Lexically clean a slash-separated path.
///
/// Follows Go's `path.Clean`: repeated slashes collapse, `.` elements are
/// dropped, `..` elements remove the preceding element (and are dropped at
/// the root of a rooted path), the trailing slash is removed and an empty
/// result becomes `.` (or `/` for rooted paths).
///
/// # Examples
///
/// ```
/// use ruststack_web_core::path::clean_path;
///
/// assert_eq!(clean_path("/a//b/./c/.."), "/a/b");
/// assert_eq!(clean_path("/../x/"), "/x");
/// assert_eq!(clean_path(""), ".");
/// ```
#[must_use]
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(resolver: &PathResolver, path: &str) -> ResolveTarget {
        match resolver.resolve(path) {
            PathResolution::Resolve(target) => target,
            PathResolution::Redirect { location } => {
                panic!("unexpected redirect for {path} to {location}")
            }
        }
    }

    fn redirect(resolver: &PathResolver, path: &str) -> String {
        match resolver.resolve(path) {
            PathResolution::Redirect { location } => location,
            PathResolution::Resolve(target) => panic!("expected redirect for {path}: {target:?}"),
        }
    }

    #[test]
    fn test_should_clean_paths_like_go() {
        let cases = [
            ("", "."),
            ("/", "/"),
            ("abc", "abc"),
            ("abc/def/", "abc/def"),
            ("a/b/../c", "a/c"),
            ("../../a", "../../a"),
            ("a/../..", ".."),
            ("//abc", "/abc"),
            ("/abc/./def", "/abc/def"),
            ("/../abc", "/abc"),
            ("/abc/../../x", "/x"),
            ("///", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_path(input), expected, "clean_path({input:?})");
        }
    }

    #[test]
    fn test_should_redirect_non_canonical_paths() {
        let resolver = PathResolver::new("site/");
        assert_eq!(redirect(&resolver, "/a//b"), "/a/b");
        assert_eq!(redirect(&resolver, "/a/./b"), "/a/b");
        assert_eq!(redirect(&resolver, "/a/../b.js"), "/b.js");
        assert_eq!(redirect(&resolver, "/a/b//"), "/a/b/");
        assert_eq!(redirect(&resolver, "/docs/../"), "/");
        assert_eq!(redirect(&resolver, "/./"), "/");
    }

    #[test]
    fn test_should_preserve_trailing_slash_on_redirect() {
        let resolver = PathResolver::new("");
        assert_eq!(redirect(&resolver, "/x/./y/"), "/x/y/");
        assert_eq!(redirect(&resolver, "/x/./y"), "/x/y");
    }

    #[test]
    fn test_should_not_redirect_single_trailing_slash() {
        let resolver = PathResolver::new("site/");
        let folder = target(&resolver, "/docs/");
        assert_eq!(folder.key, "site/docs/");
        assert!(folder.directory);
        assert!(!folder.directory_fallback);
    }

    #[test]
    fn test_should_resolve_file_with_directory_fallback() {
        let resolver = PathResolver::new("site/");
        let file = target(&resolver, "/app.js");
        assert_eq!(file.key, "site/app.js");
        assert_eq!(file.request_path, "/app.js");
        assert!(!file.directory);
        assert!(file.directory_fallback);
    }

    #[test]
    fn test_should_resolve_root_as_directory() {
        let resolver = PathResolver::new("site/");
        let root = target(&resolver, "/");
        assert_eq!(root.key, "site/");
        assert!(root.directory);

        let bare = PathResolver::new("");
        assert_eq!(target(&bare, "/").key, "");
        assert_eq!(target(&bare, "").key, "");
    }

    #[test]
    fn test_should_treat_double_slash_root_as_root() {
        let resolver = PathResolver::new("site/");
        let root = target(&resolver, "//");
        assert_eq!(root.key, "site/");
        assert!(root.directory);
    }

    #[test]
    fn test_should_unescape_percent_and_html_sequences() {
        let resolver = PathResolver::new("");
        assert_eq!(target(&resolver, "/hello%20world.txt").key, "hello world.txt");
        assert_eq!(target(&resolver, "/a&amp;b.html").key, "a&b.html");
        assert_eq!(target(&resolver, "/a&b.html").key, "a&b.html");
    }

    #[test]
    fn test_should_decode_html5_entities_individually() {
        let resolver = PathResolver::new("");
        assert_eq!(target(&resolver, "/caf&eacute;.html").key, "caf\u{e9}.html");
        assert_eq!(target(&resolver, "/a&nbsp;b.html").key, "a\u{a0}b.html");
        assert_eq!(target(&resolver, "/a&amp;b&c.html").key, "a&b&c.html");
        assert_eq!(target(&resolver, "/&#233;t&#xE9;.txt").key, "\u{e9}t\u{e9}.txt");
    }

    #[test]
    fn test_should_keep_unresolvable_references_as_written() {
        assert_eq!(unescape_path("/&bogus;&eacute;"), "/&bogus;\u{e9}");
        assert_eq!(unescape_path("/x&y&lt;z"), "/x&y<z");
        assert_eq!(unescape_path("/a&;b&amp"), "/a&;b&amp");
        assert_eq!(unescape_path("/tail&"), "/tail&");
    }

    #[test]
    fn test_should_redirect_encoded_dot_segments() {
        let resolver = PathResolver::new("");
        assert_eq!(redirect(&resolver, "/a/%2E%2E/b"), "/b");
    }

    #[test]
    fn test_should_percent_encode_redirect_location() {
        let resolver = PathResolver::new("");
        assert_eq!(redirect(&resolver, "/caf%C3%A9//menu"), "/caf%C3%A9/menu");
        assert_eq!(redirect(&resolver, "/a b//c"), "/a%20b/c");
    }
}

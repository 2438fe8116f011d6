//! Transport-independent response produced by the resolver.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, StatusCode};

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl WebResponse {
    /// A response with no headers and no body.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A `301 Moved Permanently` to `location`.
    ///
    /// Falls back to an empty 500 if `location` is not a valid header value.
    #[must_use]
    pub fn moved_permanently(location: &str) -> Self {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut response = Self::empty(StatusCode::MOVED_PERMANENTLY);
                response.headers.insert(LOCATION, value);
                response
            }
            Err(_) => Self::empty(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// A `200 OK` carrying a JSON document.
    #[must_use]
    pub fn json(body: impl Into<Bytes>) -> Self {
        let mut response = Self::empty(StatusCode::OK);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        response.body = body.into();
        response
    }

    /// A 200 response carrying an HTML page.
    #[must_use]
    pub fn html(body: impl Into<Bytes>) -> Self {
        let mut response = Self::empty(StatusCode::OK);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        response.body = body.into();
        response
    }

    /// Header value as a string, if present and visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

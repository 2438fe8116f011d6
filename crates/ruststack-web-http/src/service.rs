//! The hyper `Service` serving bucket content.
//!
//! [`WebHttpService`] handles, in order:
//!
//! 1. Health check interception (`HEALTH_CHECK_PATH`)
//! 2. Method filtering (`GET` and `HEAD` only)
//! 3. Key resolution through the [`Resolver`]
//! 4. Common response headers (`x-request-id`, `Server`)
//! 5. Request log events

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use http::header::{ACCEPT, ALLOW, CONTENT_TYPE, HeaderValue, SERVER, USER_AGENT};
use http::{HeaderMap, Method, StatusCode};
use hyper::body::Incoming;
use hyper::service::Service;
use ruststack_web_core::{EventSink, LogEvent, RequestLog, Resolver, WebConfig, WebRequest, WebResponse};
use tracing::debug;
use uuid::Uuid;

use crate::body::WebResponseBody;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Value of the `Server` header.
pub const SERVER_NAME: &str = "RustStackWeb";

const HEALTH_BODY: &str = r#"{"status":"running"}"#;

static PROCESS_HOSTNAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
});

/// Configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct WebHttpConfig {
    /// Path answered with the health document.
    pub health_check_path: String,
    /// Whether a request event is emitted per request.
    pub log_http_requests: bool,
    /// Whether `X-Forwarded-For` / `X-Real-IP` name the client.
    pub trust_proxy: bool,
    /// Host name recorded in request events.
    pub hostname: String,
}

impl Default for WebHttpConfig {
    fn default() -> Self {
        Self {
            health_check_path: "/_health".to_owned(),
            log_http_requests: true,
            trust_proxy: false,
            hostname: PROCESS_HOSTNAME.clone(),
        }
    }
}

impl From<&WebConfig> for WebHttpConfig {
    fn from(config: &WebConfig) -> Self {
        Self {
            health_check_path: config.health_check_path.clone(),
            log_http_requests: config.log_http_requests,
            trust_proxy: config.trust_proxy,
            hostname: PROCESS_HOSTNAME.clone(),
        }
    }
}

/// hyper service answering every request from the bucket.
#[derive(Clone)]
pub struct WebHttpService {
    resolver: Arc<Resolver>,
    sink: Arc<dyn EventSink>,
    config: Arc<WebHttpConfig>,
    peer_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for WebHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebHttpService")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

impl WebHttpService {
    /// Create a service.
    #[must_use]
    pub fn new(resolver: Arc<Resolver>, sink: Arc<dyn EventSink>, config: WebHttpConfig) -> Self {
        Self {
            resolver,
            sink,
            config: Arc::new(config),
            peer_addr: None,
        }
    }

    /// This service bound to one connection's remote address.
    #[must_use]
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Client address of a request: the forwarded address when proxies are
    /// trusted and one is present, otherwise the connection peer.
    fn client_ip(&self, headers: &HeaderMap) -> Option<String> {
        let forwarded = if self.config.trust_proxy {
            forwarded_client_ip(headers)
        } else {
            None
        };
        forwarded.or_else(|| self.peer_addr.map(|addr| addr.ip().to_string()))
    }

    /// Produce the response for one request. The request body is ignored.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<WebResponseBody> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let (parts, _) = req.into_parts();
        let method = parts.method;
        let path = parts.uri.path().to_owned();
        let client_ip = self.client_ip(&parts.headers);
        let user_agent = header_str(&parts.headers, USER_AGENT.as_str()).map(ToOwned::to_owned);
        debug!(%method, %path, request_id, ?client_ip, "processing request");

        let response = match method {
            Method::GET | Method::HEAD if path == self.config.health_check_path => health_check_response(),
            Method::GET | Method::HEAD => {
                let request = WebRequest {
                    path: path.clone(),
                    accept: header_str(&parts.headers, ACCEPT.as_str()).map(ToOwned::to_owned),
                };
                self.resolver.resolve(&request).await
            }
            _ => method_not_allowed_response(),
        };

        let bytes = if method == Method::HEAD {
            0
        } else {
            response.body.len() as u64
        };
        let status = response.status;
        let response = into_http_response(response, method == Method::HEAD);
        let response = add_common_headers(response, &request_id);

        if self.config.log_http_requests {
            self.sink.emit(LogEvent::Request(RequestLog {
                request_id,
                method: method.to_string(),
                path,
                status: status.as_u16(),
                bytes,
                duration: started.elapsed(),
                client_ip,
                user_agent,
                hostname: self.config.hostname.clone(),
            }));
        }

        response
    }
}

impl Service<http::Request<Incoming>> for WebHttpService {
    type Response = http::Response<WebResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First address of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(ToOwned::to_owned)
}

/// Convert an engine response into an HTTP response, dropping the body for `HEAD`.
fn into_http_response(response: WebResponse, head: bool) -> http::Response<WebResponseBody> {
    let body = if head {
        WebResponseBody::empty()
    } else {
        WebResponseBody::from_bytes(response.body)
    };
    let mut http_response = http::Response::new(body);
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;
    http_response
}

/// Produce a health check response.
fn health_check_response() -> WebResponse {
    let mut response = WebResponse::json(HEALTH_BODY);
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Produce the response for methods other than `GET` and `HEAD`.
fn method_not_allowed_response() -> WebResponse {
    let mut response = WebResponse::empty(StatusCode::METHOD_NOT_ALLOWED);
    response.headers.insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
    response
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<WebResponseBody>,
    request_id: &str,
) -> http::Response<WebResponseBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    headers.insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

//! Integration tests for RustStack Web server.
//!
//! Most tests start the HTTP service on a loopback port, backed by an
//! in-memory bucket, and talk to it with `reqwest`. Tests against a real
//! S3-compatible endpoint are marked `#[ignore]` so they don't run during
//! normal `cargo test`.
//!
//! Run them with:
//! ```text
//! S3_ENDPOINT_URL=http://localhost:4566 cargo test -p ruststack-web-integration -- --ignored
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use ruststack_web_core::{
    MemoryObjectStore, NoopSink, ObjectStore, Resolver, ResolverSettings, ResponseCache, WebConfig,
};
use ruststack_web_http::{WebHttpConfig, WebHttpService, serve};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A server running on a loopback port until dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    cache: Arc<ResponseCache>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server for `config` reading from `store`.
    pub async fn start(config: &WebConfig, store: Arc<dyn ObjectStore>) -> Self {
        init_tracing();

        let cache = Arc::new(ResponseCache::new(config.cache_mode(), config.s3_cache_misses));
        let resolver = Resolver::new(
            ResolverSettings::from(config),
            store,
            Arc::clone(&cache),
            Arc::new(NoopSink),
        );
        let service = WebHttpService::new(Arc::new(resolver), Arc::new(NoopSink), WebHttpConfig::from(config));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, service, async move {
            rx.await.ok();
        }));

        Self {
            addr,
            cache,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// Start a server with the given config over an in-memory bucket.
    pub async fn with_memory(config: &WebConfig, store: &Arc<MemoryObjectStore>) -> Self {
        Self::start(config, Arc::clone(store) as Arc<dyn ObjectStore>).await
    }

    /// Absolute URL of `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// The server's response cache.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}

/// Base configuration shared by the tests.
#[must_use]
pub fn base_config() -> WebConfig {
    WebConfig::builder()
        .s3_bucket("site".into())
        .s3_region(Some("us-east-1".into()))
        .build()
}

/// HTTP client that reports redirects instead of following them.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build http client")
}

/// Endpoint URL of an S3-compatible server for the ignored tests.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured S3 client pointing at the S3-compatible server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Web configuration reading `bucket` through the S3-compatible server.
#[must_use]
pub fn s3_web_config(bucket: &str) -> WebConfig {
    WebConfig::builder()
        .s3_bucket(bucket.to_owned())
        .s3_region(Some("us-east-1".into()))
        .s3_endpoint(Some(endpoint_url()))
        .s3_force_path_style(true)
        .aws_access_key_id(Some("test".into()))
        .aws_secret_access_key(Some("test".into()))
        .build()
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return;
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_cache;
mod test_listing;
mod test_s3;
mod test_serving;

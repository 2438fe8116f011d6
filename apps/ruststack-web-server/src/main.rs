//! RustStack Web Server - serves a static website out of an S3 bucket.
//!
//! Requests are resolved against the bucket the way a static web host
//! resolves them against a directory: folder index files, an optional
//! default 404 page, optional JSON folder listings and canonical-path
//! redirects. Store responses are cached in memory.
//!
//! # Usage
//!
//! ```text
//! S3_BUCKET=my-site S3_REGION=eu-west-1 ruststack-web-server
//! ```
//!
//! See [`WebConfig::from_env`] for every environment variable. `RUST_LOG`
//! overrides `LOG_LEVEL` for fine-grained tracing filters.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ruststack_web_core::{
    ChannelSink, EventSink, LogFormat, Resolver, ResolverSettings, ResponseCache, WebConfig, spawn_consumer,
    spawn_sweeper,
};
use ruststack_web_http::{WebHttpConfig, WebHttpService, serve_with_drain_timeout};
use ruststack_web_s3::S3ObjectStore;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long in-flight requests may take to finish on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long queued log events may take to flush on shutdown.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

/// Address the health check connects to: the listen address with a
/// wildcard host replaced by loopback.
fn health_check_addr(gateway_listen: &str) -> String {
    gateway_listen.replace("0.0.0.0", "127.0.0.1")
}

/// Whether a raw HTTP response is a successful health document.
fn is_healthy_response(response: &str) -> bool {
    response.starts_with("HTTP/1.1 200") && response.contains(r#""status":"running""#)
}

/// Perform a health check by connecting to the gateway and requesting the health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str, path: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if is_healthy_response(&response) {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

/// Name of whichever signal arrives first.
async fn first_signal<I, T>(interrupt: I, terminate: T) -> &'static str
where
    I: Future<Output = ()>,
    T: Future<Output = ()>,
{
    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

/// Resolve when the process receives SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = first_signal(interrupt, terminate).await;
    info!(signal, "received shutdown signal, draining connections");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WebConfig::from_env().context("invalid configuration")?;

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = health_check_addr(&config.gateway_listen);
        let healthy = run_health_check(&addr, &config.health_check_path).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level, config.log_format)?;

    info!(
        gateway_listen = %config.gateway_listen,
        bucket = %config.s3_bucket,
        folder = %config.s3_folder,
        cache_mode = ?config.cache_mode(),
        cache_misses = ?config.s3_cache_misses,
        directory_listing = config.enable_directory_listing,
        version = VERSION,
        "starting RustStack Web Server",
    );

    let store = S3ObjectStore::from_config(&config).await;

    let cache = Arc::new(ResponseCache::new(config.cache_mode(), config.s3_cache_misses));
    let sweeper = spawn_sweeper(Arc::clone(&cache), config.sweep_interval());

    let (sink, events) = ChannelSink::new(config.access_log_queue_size);
    let consumer = spawn_consumer(events);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let settings = ResolverSettings::from(&config);
    let (allow, deny) = settings.cache_control.pattern_counts();
    info!(allow, deny, "cache-control patterns compiled");

    let resolver = Resolver::new(settings, Arc::new(store), cache, Arc::clone(&sink));
    let service = WebHttpService::new(Arc::new(resolver), sink, WebHttpConfig::from(&config));

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve_with_drain_timeout(listener, service, shutdown_signal(), SHUTDOWN_TIMEOUT).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if tokio::time::timeout(LOG_FLUSH_TIMEOUT, consumer).await.is_err() {
        warn!("timed out flushing log events");
    }
    info!("exiting");

    Ok(())
}

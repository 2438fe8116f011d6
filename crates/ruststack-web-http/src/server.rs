//! Accept loop with graceful shutdown.

use std::future::Future;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::service::WebHttpService;

/// How long in-flight requests may take to finish once shutdown starts.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve connections from `listener` until `shutdown` resolves, then wait up
/// to [`DEFAULT_DRAIN_TIMEOUT`] for in-flight requests to complete.
pub async fn serve<F>(listener: TcpListener, service: WebHttpService, shutdown: F)
where
    F: Future<Output = ()>,
{
    serve_with_drain_timeout(listener, service, shutdown, DEFAULT_DRAIN_TIMEOUT).await;
}

/// Like [`serve`], with an explicit drain timeout. Connections still open
/// when it elapses are dropped.
pub async fn serve_with_drain_timeout<F>(
    listener: TcpListener,
    service: WebHttpService,
    shutdown: F,
    drain_timeout: Duration,
) where
    F: Future<Output = ()>,
{
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone().with_peer_addr(peer_addr);
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    if tokio::time::timeout(drain_timeout, graceful.shutdown()).await.is_ok() {
        info!("all connections drained");
    } else {
        warn!(?drain_timeout, "timed out draining connections");
    }
}

//! Structured log events.
//!
//! The engine and the HTTP layer describe what happened as [`LogEvent`]s and
//! hand them to an [`EventSink`]. [`ChannelSink`] queues them on a bounded
//! channel drained by [`spawn_consumer`], so emitting never blocks a request.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ConfigError;

/// Which store calls produce a log event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreLogLevel {
    /// No store events.
    None,
    /// Failed calls only.
    #[default]
    Error,
    /// Every call.
    Info,
}

impl StoreLogLevel {
    /// Whether a call with the given outcome is logged.
    #[must_use]
    pub fn logs(self, failed: bool) -> bool {
        match self {
            Self::None => false,
            Self::Error => failed,
            Self::Info => true,
        }
    }
}

impl FromStr for StoreLogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "error" => Ok(Self::Error),
            "info" => Ok(Self::Info),
            _ => Err(ConfigError::Invalid {
                name: "S3_LOG_LEVEL",
                value: s.to_owned(),
            }),
        }
    }
}

/// One served HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// Request id, echoed in the `x-request-id` header.
    pub request_id: String,
    /// HTTP method.
    pub method: String,
    /// Raw request path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Response body size.
    pub bytes: u64,
    /// Time spent producing the response.
    pub duration: Duration,
    /// Client address; the forwarded one when proxies are trusted.
    pub client_ip: Option<String>,
    /// Value of the `User-Agent` header.
    pub user_agent: Option<String>,
    /// Host name of the serving process.
    pub hostname: String,
}

/// One store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreLog {
    /// `GetObject` or `ListObjectsV2`.
    pub operation: &'static str,
    /// Key or prefix the call was issued for.
    pub key: String,
    /// Time spent in the call.
    pub duration: Duration,
    /// Error message for failed calls.
    pub error: Option<String>,
}

/// A structured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// An HTTP request finished.
    Request(RequestLog),
    /// A store call finished.
    Store(StoreLog),
}

/// Destination for log events.
pub trait EventSink: Send + Sync + 'static {
    /// Hand over one event. Must not block.
    fn emit(&self, event: LogEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: LogEvent) {}
}

/// Sink backed by a bounded queue. Events are dropped when the queue is full.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<LogEvent>,
    dropped: Arc<AtomicU64>,
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("capacity", &self.tx.max_capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl ChannelSink {
    /// Create a sink and the receiving end of its queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Number of events dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LogEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Drain the queue on a background task, writing every event through `tracing`.
pub fn spawn_consumer(mut rx: mpsc::Receiver<LogEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            write_event(&event);
        }
    })
}

#[allow(clippy::cast_possible_truncation)]
fn write_event(event: &LogEvent) {
    match event {
        LogEvent::Request(req) => {
            let duration_ms = req.duration.as_millis() as u64;
            let ip = req.client_ip.as_deref().unwrap_or("-");
            let user_agent = req.user_agent.as_deref().unwrap_or("-");
            if req.status >= 500 {
                error!(
                    request_id = %req.request_id, ip, method = %req.method, path = %req.path,
                    status = req.status, bytes = req.bytes, duration_ms, user_agent,
                    hostname = %req.hostname, "request"
                );
            } else if req.status >= 400 {
                warn!(
                    request_id = %req.request_id, ip, method = %req.method, path = %req.path,
                    status = req.status, bytes = req.bytes, duration_ms, user_agent,
                    hostname = %req.hostname, "request"
                );
            } else {
                info!(
                    request_id = %req.request_id, ip, method = %req.method, path = %req.path,
                    status = req.status, bytes = req.bytes, duration_ms, user_agent,
                    hostname = %req.hostname, "request"
                );
            }
        }
        LogEvent::Store(call) => {
            let duration_ms = call.duration.as_millis() as u64;
            match &call.error {
                Some(err) => error!(
                    operation = call.operation, key = %call.key, duration_ms, error = %err,
                    "store call failed"
                ),
                None => info!(operation = call.operation, key = %call.key, duration_ms, "store call"),
            }
        }
    }
}

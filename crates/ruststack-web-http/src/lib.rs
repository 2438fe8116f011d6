//! HTTP layer for RustStack Web.
//!
//! - **Service** ([`service`]): [`WebHttpService`](service::WebHttpService)
//!   implements hyper's `Service` trait. It intercepts health checks, filters
//!   methods, hands `GET`/`HEAD` requests to the key resolution engine and
//!   adds the common response headers.
//!
//! - **Server** ([`server`]): the accept loop with graceful shutdown.
//!
//! - **Body** ([`body`]): [`WebResponseBody`](body::WebResponseBody)
//!   supporting buffered and empty response modes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ruststack_web_core::{MemoryObjectStore, NoopSink, Resolver, ResolverSettings, ResponseCache, WebConfig};
//! use ruststack_web_http::{WebHttpConfig, WebHttpService};
//!
//! let config = WebConfig::default();
//! let resolver = Resolver::new(
//!     ResolverSettings::from(&config),
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(ResponseCache::disabled()),
//!     Arc::new(NoopSink),
//! );
//! let service = WebHttpService::new(Arc::new(resolver), Arc::new(NoopSink), WebHttpConfig::from(&config));
//! // Use `service` with hyper server.
//! ```

pub mod body;
pub mod server;
pub mod service;

pub use body::WebResponseBody;
pub use server::{DEFAULT_DRAIN_TIMEOUT, serve, serve_with_drain_timeout};
pub use service::{WebHttpConfig, WebHttpService};

//! Static website serving out of an S3 bucket.
//!
//! This crate holds everything that does not depend on a transport or on a
//! concrete store client: request path canonicalization, the key resolution
//! state machine (file, folder index, folder listing and fallback pages),
//! the response cache and the cache-control policy.
//!
//! # Architecture
//!
//! ```text
//! WebRequest
//!     |
//!     v
//! PathResolver ──non-canonical──> 301
//!     |
//!     v
//! Resolver (Directory / File steps)
//!     |
//!     v
//! ResponseCache ──miss──> ObjectStore (S3, memory)
//! ```

pub mod cache;
pub mod cache_control;
pub mod config;
pub mod error;
pub mod memory;
pub mod path;
pub mod resolver;
pub mod response;
pub mod sink;
pub mod store;

pub use cache::{CacheMissPolicy, CacheMode, ResponseCache, spawn_sweeper};
pub use config::{LogFormat, WebConfig};
pub use error::{ConfigError, StoreError};
pub use memory::MemoryObjectStore;
pub use resolver::{Resolver, ResolverSettings, WebRequest};
pub use response::WebResponse;
pub use sink::{ChannelSink, EventSink, LogEvent, NoopSink, RequestLog, StoreLog, spawn_consumer};
pub use store::{ObjectStore, StoredObject};

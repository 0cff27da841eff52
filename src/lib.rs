//! # cachet
//!
//! A single-flight HTTP response cache layer built on a from-scratch async
//! HTTP/1.1 server core.
//!
//! The cache sits in front of arbitrary request handlers as a middleware:
//! it derives a deterministic key per logical request (normalizing JSON
//! bodies so field order and whitespace don't matter), serves stored
//! responses verbatim while they are fresh, coalesces concurrent duplicate
//! requests into a single downstream execution, and persists successful
//! responses to a pluggable [`cache::CacheStore`] off the response path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cachet::background::WriteBackQueue;
//! use cachet::cache::{CacheLayer, MemoryStore};
//! use cachet::context::Context;
//! use cachet::middleware::{Next, from_middleware};
//! use cachet::server::Server;
//! use cachet::{Method, Response, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let writeback = Arc::new(WriteBackQueue::spawn(store.clone(), 64));
//!     let cache = CacheLayer::new(store, writeback, Duration::from_secs(300))
//!         .cache_route(Method::Get, "/ping");
//!
//!     let mut router = Router::new();
//!     router.get("/ping", |_ctx| async {
//!         Response::new(StatusCode::Ok).body("pong")
//!     });
//!
//!     let chain = vec![from_middleware(Arc::new(cache)), router.into_handler()];
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req| {
//!             let chain = chain.clone();
//!             async move { Next::new(chain).run(Context::new(req)).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};

//! The response cache middleware — coalescing executor over the store.
//!
//! Per cacheable request the layer derives a key, then either *leads* the
//! execution for that key (store lookup, downstream execution on miss,
//! write-back on success) or *waits* on whoever already does and reuses
//! their outcome. Different keys never contend; duplicate keys execute the
//! downstream handler exactly once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::background::WriteBackQueue;
use crate::cache::capture::CachedResponse;
use crate::cache::flight::{Flight, FlightGroup};
use crate::cache::key::build_key;
use crate::cache::store::CacheStore;
use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Method, Response};

/// Request header that disables caching for a single request.
pub const BYPASS_HEADER: &str = "X-Bypass-Cache";

/// Response header marking a response that did not come from a fresh
/// handler execution (store hit or coalesced onto another caller's).
pub const FROM_CACHE_HEADER: &str = "X-From-Cache";

// What a leader publishes to its waiters.
#[derive(Clone)]
struct FlightOutcome {
    response: Arc<CachedResponse>,
}

/// Response-caching middleware.
///
/// Only GET and POST requests on explicitly allow-listed routes are
/// considered; everything else passes straight through. Cacheability is
/// routing policy — endpoints with side effects must simply not be
/// registered via [`cache_route`](Self::cache_route).
///
/// The store is consulted fail-open: if it is unreachable, requests
/// execute uncached and the failure is logged, never surfaced.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use cachet::Method;
/// use cachet::background::WriteBackQueue;
/// use cachet::cache::{CacheLayer, MemoryStore};
///
/// # async fn wire() {
/// let store = Arc::new(MemoryStore::new());
/// let writeback = Arc::new(WriteBackQueue::spawn(store.clone(), 64));
/// let cache = CacheLayer::new(store, writeback, Duration::from_secs(300))
///     .cache_route(Method::Get, "/ping")
///     .cache_route(Method::Post, "/ping");
/// # }
/// ```
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    writeback: Arc<WriteBackQueue>,
    flights: FlightGroup<FlightOutcome>,
    ttl: Duration,
    routes: Vec<(Method, String)>,
}

impl CacheLayer {
    /// Creates a layer that persists successful responses for `ttl`.
    pub fn new(
        store: Arc<dyn CacheStore>,
        writeback: Arc<WriteBackQueue>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            writeback,
            flights: FlightGroup::new(),
            ttl,
            routes: Vec::new(),
        }
    }

    /// Allow-lists a route for caching. Paths match exactly.
    #[must_use]
    pub fn cache_route(mut self, method: Method, path: &str) -> Self {
        self.routes.push((method, path.to_owned()));
        self
    }

    fn is_cacheable(&self, method: &Method, path: &str) -> bool {
        matches!(method, Method::Get | Method::Post)
            && self.routes.iter().any(|(m, p)| m == method && p == path)
    }
}

impl Middleware for CacheLayer {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let request = ctx.request();
        let method = request.method().clone();
        let path = request.path().to_owned();

        if !self.is_cacheable(&method, &path) {
            return Box::pin(next.run(ctx));
        }
        if request.headers().get(BYPASS_HEADER) == Some("true") {
            debug!(%method, path = %path, "cache bypass requested");
            return Box::pin(next.run(ctx));
        }

        let key = build_key(&method, &path, request.query_string(), request.body());
        debug!(%method, path = %path, key = %key, "derived cache key");

        let store = Arc::clone(&self.store);
        let writeback = Arc::clone(&self.writeback);
        let flights = self.flights.clone();
        let ttl = self.ttl;

        Box::pin(async move {
            match flights.join(&key) {
                Flight::Leader(guard) => {
                    // Leader: consult the store first.
                    match store.get(&key).await {
                        Ok(Some(raw)) => match CachedResponse::decode(raw) {
                            Ok(snapshot) => {
                                debug!(key = %key, "cache hit");
                                let snapshot = Arc::new(snapshot);
                                let mut response = snapshot.to_response();
                                response.add_header(FROM_CACHE_HEADER, "true");
                                guard.complete(FlightOutcome { response: snapshot });
                                return response;
                            }
                            Err(e) => {
                                warn!(key = %key, error = %e, "stored payload undecodable — treating as miss");
                            }
                        },
                        Ok(None) => {}
                        Err(e) => {
                            // Fail open: the handler still runs, only the
                            // caching benefit is lost.
                            warn!(key = %key, error = %e, "cache store lookup failed — continuing uncached");
                        }
                    }

                    // Miss: execute the downstream chain exactly once for
                    // this key, then share the captured result.
                    let response = next.run(ctx).await;
                    let snapshot = Arc::new(CachedResponse::capture(&response));

                    if response.status().is_success() {
                        writeback.enqueue(key.clone(), snapshot.encode(), ttl);
                    } else {
                        debug!(
                            key = %key,
                            status = response.status().as_u16(),
                            "non-success response not persisted"
                        );
                    }

                    guard.complete(FlightOutcome { response: snapshot });
                    response
                }
                Flight::Waiter(waiter) => match waiter.outcome().await {
                    Ok(outcome) => {
                        debug!(key = %key, "reusing coalesced result");
                        let mut response = outcome.response.to_response();
                        response.add_header(FROM_CACHE_HEADER, "true");
                        response
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "coalesced leader aborted — executing uncached");
                        next.run(ctx).await
                    }
                },
            }
        })
    }
}

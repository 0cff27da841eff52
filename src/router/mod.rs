//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! This module provides [`Router`], which dispatches incoming HTTP requests to handler
//! functions based on the request method and URL path. Two pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/users`             | `/users`                   | *(none)*                     |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                  |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/users/` and
//! `/users` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins. The router also decides *which* endpoints sit behind
//! the response cache — [`crate::cache::CacheLayer`] carries an explicit per-route
//! allow-list, so cacheability is routing policy, not handler behavior.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::MiddlewareHandler;
use crate::{Method, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared across
/// threads without copying the underlying closure. In practice you never construct this
/// type directly — use [`Router::get`], [`Router::post`], and the other method-specific
/// helpers instead.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/users/:id`.
    Parameterized { segments: Vec<Segment> },
}

impl Pattern {
    // Parse a route pattern string. A trailing slash (other than on the root `/`)
    // is stripped before classification so that `/users/` and `/users` compile to
    // identical patterns.
    fn parse(pattern: &str) -> Self {
        let pattern = if pattern != "/" && pattern.ends_with('/') {
            &pattern[..pattern.len() - 1]
        } else {
            pattern
        };

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(p) = s.strip_prefix(':') {
                        Segment::Parameter(p.to_string())
                    } else {
                        Segment::Static(s.to_string())
                    }
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = if path != "/" && path.ends_with('/') {
            &path[..path.len() - 1]
        } else {
            path
        };

        match self {
            Pattern::Exact(p) => {
                if p == path {
                    Some(PathParams::new())
                } else {
                    None
                }
            }
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            pattern: Pattern::parse(pattern),
            handler,
        }
    }

    // Returns `Some(params)` when both the HTTP method and path pattern match, `None` otherwise.
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// Routes are evaluated in registration order; the first route whose HTTP method and path
/// pattern both match the incoming request is used. When no route matches, a
/// `404 Not Found` response is returned automatically.
///
/// # Examples
///
/// ```rust,no_run
/// use cachet::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok).body("pong") });
///
/// router.get("/users/:id", |ctx: cachet::context::Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route::new(method, path, handler));
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch the context to the first matching route and return its response.
    ///
    /// Routes are tested in registration order. The first route whose HTTP method and path
    /// pattern both match wins; the context is rebuilt with the captured path parameters
    /// before the handler runs. If no route matches, a `404 Not Found` response is
    /// returned.
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_owned();

        for route in &self.routes {
            if let Some(params) = route.matches(&method, &path) {
                let ctx = Context::with_params(ctx.into_request(), params);
                return (route.handler)(ctx).await;
            }
        }

        Response::new(StatusCode::NotFound)
    }

    /// Convert the router into the terminal element of a middleware chain.
    ///
    /// The returned handler ignores its `Next` cursor — routing is always the
    /// last step of the pipeline.
    pub fn into_handler(self) -> MiddlewareHandler {
        let router = Arc::new(self);
        Arc::new(move |ctx: Context, _next| {
            let router = Arc::clone(&router);
            Box::pin(async move { router.dispatch(ctx).await })
        })
    }
}

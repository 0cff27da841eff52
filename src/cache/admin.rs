//! Administrative cache operations and their HTTP surface.
//!
//! Invalidation, refresh, and bulk clearing sit on top of the store
//! contract. The HTTP handlers derive keys through the *same*
//! [`build_key`] as live traffic — if admin key derivation ever diverged
//! from the middleware's, invalidation would silently miss.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::key::build_key;
use crate::cache::store::{CacheStore, StoreError};
use crate::context::Context;
use crate::router::Router;
use crate::{Method, Response, StatusCode};

// Page size for the prefix scan loop, mirroring a Redis SCAN COUNT hint.
const SCAN_PAGE: usize = 100;

/// Result of an admin mutation. A missing key is a benign outcome, not an
/// error — admin callers receive it as a successful "nothing to do".
#[derive(Debug, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The entry existed and was acted upon.
    Applied,
    /// No entry under that key.
    NotFound,
}

/// Administrative mutations over a [`CacheStore`].
pub struct CacheAdmin {
    store: Arc<dyn CacheStore>,
}

impl CacheAdmin {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Deletes the entry under `key`.
    pub async fn invalidate(&self, key: &str) -> Result<AdminOutcome, StoreError> {
        info!(key = %key, "invalidating cache entry");
        if self.store.del(key).await? {
            Ok(AdminOutcome::Applied)
        } else {
            Ok(AdminOutcome::NotFound)
        }
    }

    /// Re-stores the existing payload under `key` with a fresh TTL.
    ///
    /// The payload is read back and rewritten rather than merely
    /// re-expired, so the stored bytes are bit-identical before and after —
    /// refresh changes expiration, never content.
    pub async fn refresh(&self, key: &str, ttl: Duration) -> Result<AdminOutcome, StoreError> {
        info!(key = %key, ttl_secs = ttl.as_secs(), "refreshing cache entry");
        match self.store.get(key).await? {
            None => Ok(AdminOutcome::NotFound),
            Some(payload) => {
                self.store.set(key, payload, ttl).await?;
                Ok(AdminOutcome::Applied)
            }
        }
    }

    /// Deletes every key starting with `prefix`, paging through the store's
    /// scan cursor. Returns the number of entries deleted; zero means
    /// nothing matched.
    pub async fn clear_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (page, next) = self.store.scan_prefix(prefix, cursor, SCAN_PAGE).await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut deleted = 0;
        for key in &keys {
            if self.store.del(key).await? {
                deleted += 1;
            }
        }
        info!(prefix = %prefix, deleted, "cleared cache entries by prefix");
        Ok(deleted)
    }

    /// Registers the admin endpoints on `router`:
    ///
    /// - `POST /cache/invalidate {method, path, body?}`
    /// - `POST /cache/refresh {method, path, body?, duration}`
    /// - `POST /cache/clear {prefix}`
    pub fn mount(self: Arc<Self>, router: &mut Router) {
        let admin = Arc::clone(&self);
        router.post("/cache/invalidate", move |ctx: Context| {
            let admin = Arc::clone(&admin);
            async move { invalidate_handler(admin, ctx).await }
        });

        let admin = Arc::clone(&self);
        router.post("/cache/refresh", move |ctx: Context| {
            let admin = Arc::clone(&admin);
            async move { refresh_handler(admin, ctx).await }
        });

        let admin = self;
        router.post("/cache/clear", move |ctx: Context| {
            let admin = Arc::clone(&admin);
            async move { clear_handler(admin, ctx).await }
        });
    }
}

#[derive(Deserialize)]
struct InvalidateInput {
    method: String,
    path: String,
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
struct RefreshInput {
    method: String,
    path: String,
    #[serde(default)]
    body: String,
    /// New TTL in seconds. Must be at least 1.
    duration: u64,
}

#[derive(Deserialize)]
struct ClearInput {
    prefix: String,
}

// The `{"code": .., "msg": ..}` envelope every admin endpoint speaks.
fn envelope(status: StatusCode, code: u16, msg: &str) -> Response {
    Response::new(status)
        .header("Content-Type", "application/json")
        .body(serde_json::json!({ "code": code, "msg": msg }).to_string())
}

fn bad_request(msg: &str) -> Response {
    envelope(StatusCode::BadRequest, 400, msg)
}

// Admin inputs describe the original request; only the two cacheable
// methods make sense here.
fn parse_admin_method(method: &str) -> Option<Method> {
    match method {
        "GET" => Some(Method::Get),
        "POST" => Some(Method::Post),
        _ => None,
    }
}

// Key derivation for admin inputs: same builder as live traffic, no query
// component (admin inputs address routes, not query variants).
fn admin_key(method: &Method, path: &str, body: &str) -> String {
    build_key(method, path, None, body.as_bytes())
}

async fn invalidate_handler(admin: Arc<CacheAdmin>, ctx: Context) -> Response {
    let input: InvalidateInput = match ctx.json() {
        Ok(input) => input,
        Err(e) => {
            debug!(error = %e, "invalid invalidate request body");
            return bad_request("invalid request body");
        }
    };
    let Some(method) = parse_admin_method(&input.method) else {
        return bad_request("method must be GET or POST");
    };

    let key = admin_key(&method, &input.path, &input.body);
    match admin.invalidate(&key).await {
        Ok(AdminOutcome::Applied) => {
            envelope(StatusCode::Ok, 0, "Cache invalidated successfully")
        }
        Ok(AdminOutcome::NotFound) => envelope(StatusCode::Ok, 0, "Cache key not found"),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "failed to invalidate cache");
            envelope(
                StatusCode::InternalServerError,
                500,
                "Failed to invalidate cache",
            )
        }
    }
}

async fn refresh_handler(admin: Arc<CacheAdmin>, ctx: Context) -> Response {
    let input: RefreshInput = match ctx.json() {
        Ok(input) => input,
        Err(e) => {
            debug!(error = %e, "invalid refresh request body");
            return bad_request("invalid request body");
        }
    };
    let Some(method) = parse_admin_method(&input.method) else {
        return bad_request("method must be GET or POST");
    };
    if input.duration == 0 {
        return bad_request("duration must be at least 1 second");
    }

    let key = admin_key(&method, &input.path, &input.body);
    match admin
        .refresh(&key, Duration::from_secs(input.duration))
        .await
    {
        Ok(AdminOutcome::Applied) => envelope(StatusCode::Ok, 0, "Cache refreshed successfully"),
        Ok(AdminOutcome::NotFound) => envelope(StatusCode::Ok, 0, "Cache key not found"),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "failed to refresh cache");
            envelope(
                StatusCode::InternalServerError,
                500,
                "Failed to refresh cache",
            )
        }
    }
}

async fn clear_handler(admin: Arc<CacheAdmin>, ctx: Context) -> Response {
    let input: ClearInput = match ctx.json() {
        Ok(input) => input,
        Err(e) => {
            debug!(error = %e, "invalid clear request body");
            return bad_request("invalid request body");
        }
    };

    match admin.clear_prefix(&input.prefix).await {
        Ok(0) => envelope(
            StatusCode::Ok,
            0,
            "No cache entries found with the given prefix",
        ),
        Ok(_) => envelope(StatusCode::Ok, 0, "Cache cleared successfully"),
        Err(e) => {
            tracing::error!(prefix = %input.prefix, error = %e, "failed to clear cache");
            envelope(StatusCode::InternalServerError, 500, "Failed to clear cache")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::Request;
    use crate::cache::capture::CachedResponse;
    use crate::cache::store::MemoryStore;

    fn seeded_admin() -> (Arc<CacheAdmin>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::new(CacheAdmin::new(store.clone())), store)
    }

    async fn seed(store: &MemoryStore, key: &str) {
        let snapshot =
            CachedResponse::capture(&Response::new(StatusCode::Ok).body("pong"));
        store
            .set(key, snapshot.encode(), Duration::from_secs(300))
            .await
            .unwrap();
    }

    fn post_json(path: &str, body: &str) -> Context {
        let raw = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    fn body_text(response: &Response) -> String {
        String::from_utf8(response.body_ref().to_vec()).unwrap()
    }

    // ── Operations ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalidate_deletes_entry() {
        let (admin, store) = seeded_admin();
        seed(&store, "v1:/ping").await;

        assert_eq!(
            admin.invalidate("v1:/ping").await.unwrap(),
            AdminOutcome::Applied
        );
        assert!(!store.exists("v1:/ping").await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_missing_key_is_benign() {
        let (admin, _) = seeded_admin();
        assert_eq!(
            admin.invalidate("v1:/absent").await.unwrap(),
            AdminOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn refresh_keeps_payload_bit_identical() {
        let (admin, store) = seeded_admin();
        seed(&store, "v1:/ping").await;
        let before = store.get("v1:/ping").await.unwrap().unwrap();

        assert_eq!(
            admin
                .refresh("v1:/ping", Duration::from_secs(600))
                .await
                .unwrap(),
            AdminOutcome::Applied
        );

        let after = store.get("v1:/ping").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn refresh_missing_key_is_benign() {
        let (admin, _) = seeded_admin();
        assert_eq!(
            admin
                .refresh("v1:/absent", Duration::from_secs(1))
                .await
                .unwrap(),
            AdminOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn clear_prefix_deletes_only_matches() {
        let (admin, store) = seeded_admin();
        for i in 0..250 {
            store
                .set(
                    &format!("v1:/user/{i}"),
                    Bytes::from_static(b"x"),
                    Duration::from_secs(300),
                )
                .await
                .unwrap();
        }
        seed(&store, "v1:/ping").await;

        // More entries than one scan page, so the cursor loop matters.
        assert_eq!(admin.clear_prefix("v1:/user").await.unwrap(), 250);
        assert!(store.exists("v1:/ping").await.unwrap());
    }

    #[tokio::test]
    async fn clear_prefix_without_matches_reports_zero() {
        let (admin, _) = seeded_admin();
        assert_eq!(admin.clear_prefix("v1:/user").await.unwrap(), 0);
    }

    // ── HTTP surface ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalidate_endpoint_round_trip() {
        let (admin, store) = seeded_admin();
        // Same key the live middleware would derive for GET /ping.
        seed(&store, &build_key(&Method::Get, "/ping", None, b"")).await;

        let mut router = Router::new();
        admin.mount(&mut router);

        let response = router
            .dispatch(post_json(
                "/cache/invalidate",
                r#"{"method":"GET","path":"/ping"}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(body_text(&response).contains("Cache invalidated successfully"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn refresh_endpoint_missing_key_is_success_not_error() {
        let (admin, _) = seeded_admin();
        let mut router = Router::new();
        admin.mount(&mut router);

        let response = router
            .dispatch(post_json(
                "/cache/refresh",
                r#"{"method":"GET","path":"/ping","duration":1}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(body_text(&response).contains("Cache key not found"));
    }

    #[tokio::test]
    async fn clear_endpoint_no_matches_is_success() {
        let (admin, _) = seeded_admin();
        let mut router = Router::new();
        admin.mount(&mut router);

        let response = router
            .dispatch(post_json("/cache/clear", r#"{"prefix":"v1:/user"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(body_text(&response).contains("No cache entries found"));
    }

    #[tokio::test]
    async fn admin_method_outside_allowed_set_is_rejected() {
        let (admin, _) = seeded_admin();
        let mut router = Router::new();
        admin.mount(&mut router);

        let response = router
            .dispatch(post_json(
                "/cache/invalidate",
                r#"{"method":"DELETE","path":"/ping"}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn malformed_admin_body_is_rejected() {
        let (admin, _) = seeded_admin();
        let mut router = Router::new();
        admin.mount(&mut router);

        let response = router
            .dispatch(post_json("/cache/clear", "{not json"))
            .await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn admin_body_keys_match_live_traffic_keys() {
        let (admin, store) = seeded_admin();
        let body = r#"{"user":"u","pass":"p"}"#;
        // Live traffic stored under the normalized-body key...
        seed(&store, &build_key(&Method::Post, "/login", None, body.as_bytes())).await;

        let mut router = Router::new();
        admin.mount(&mut router);

        // ...and the admin input carries the same body with permuted keys.
        let permuted = r#"{"pass":"p","user":"u"}"#;
        let input = serde_json::json!({
            "method": "POST",
            "path": "/login",
            "body": permuted,
        })
        .to_string();
        let response = router
            .dispatch(post_json("/cache/invalidate", &input))
            .await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert!(body_text(&response).contains("Cache invalidated successfully"));
        assert!(store.is_empty());
    }
}

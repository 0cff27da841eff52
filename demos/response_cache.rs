//! Runnable demo: a cached `/ping` endpoint plus the cache admin surface.
//!
//! ```text
//! curl http://127.0.0.1:8080/ping
//! curl -i http://127.0.0.1:8080/ping                 # X-From-Cache: true
//! curl -H 'X-Bypass-Cache: true' http://127.0.0.1:8080/ping
//! curl -X POST http://127.0.0.1:8080/cache/invalidate \
//!      -d '{"method":"GET","path":"/ping"}'
//! curl -X POST http://127.0.0.1:8080/cache/clear -d '{"prefix":"v1:/"}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use cachet::background::WriteBackQueue;
use cachet::cache::{CacheAdmin, CacheLayer, MemoryStore};
use cachet::context::Context;
use cachet::middleware::{LoggerMiddleware, Next, from_middleware};
use cachet::server::Server;
use cachet::{Method, Response, Router, StatusCode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cachet=debug".into()),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    let writeback = Arc::new(WriteBackQueue::spawn(store.clone(), 64));
    let cache = CacheLayer::new(store.clone(), writeback, Duration::from_secs(300))
        .cache_route(Method::Get, "/ping")
        .cache_route(Method::Post, "/ping");

    let mut router = Router::new();
    router.get("/ping", ping);
    router.post("/ping", ping);
    Arc::new(CacheAdmin::new(store)).mount(&mut router);

    let chain = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(cache)),
        router.into_handler(),
    ];

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());

    server
        .run(move |req| {
            let chain = chain.clone();
            async move { Next::new(chain).run(Context::new(req)).await }
        })
        .await?;
    Ok(())
}

async fn ping(_ctx: Context) -> Response {
    Response::new(StatusCode::Ok)
        .header("Content-Type", "application/json")
        .body(r#"{"code":0,"msg":"Pong"}"#)
}

//! Per-request context passed through the middleware chain to handlers.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create a new empty parameters map.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a captured parameter value.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Get a parameter value by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }
}

/// Per-request context carrying the parsed request and routing state.
///
/// Middleware receives a `Context` and passes it down the chain; the router
/// fills in [`PathParams`] when a parameterized route matches. Handlers that
/// accept JSON bodies (the cache admin endpoints, for example) deserialize
/// them through [`json`](Self::json).
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Create a context from a request with no path parameters.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
        }
    }

    /// Create a context carrying parameters captured by the router.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consumes the context, yielding the request. The router uses this to
    /// rebuild a context carrying the matched route's parameters.
    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Deserialize the request body as JSON into `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_deserializes() {
        #[derive(serde::Deserialize)]
        struct Input {
            prefix: String,
        }

        let raw = b"POST /cache/clear HTTP/1.1\r\nHost: localhost\r\nContent-Length: 18\r\n\r\n{\"prefix\":\"v1:/u\"}";
        let (req, _) = Request::parse(raw).unwrap();
        let ctx = Context::new(req);
        let input: Input = ctx.json().unwrap();
        assert_eq!(input.prefix, "v1:/u");
    }

    #[test]
    fn params_round_trip() {
        let mut params = PathParams::new();
        params.insert("id".into(), "42".into());
        let raw = b"GET /users/42 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let ctx = Context::with_params(req, params);
        assert_eq!(ctx.params().get("id"), Some("42"));
    }
}

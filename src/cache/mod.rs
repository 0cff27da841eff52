//! The response cache — key derivation, single-flight coalescing,
//! captured-response storage, and admin operations.
//!
//! ## Pieces
//!
//! - [`CacheStore`] / [`MemoryStore`] — the key/value seam with TTL
//!   expiration and cursor-paginated prefix scans.
//! - [`build_key`] / [`normalize_json`] — deterministic cache keys; JSON
//!   bodies are canonicalized so field order and whitespace don't fragment
//!   the key space.
//! - [`CachedResponse`] — immutable snapshot of a downstream response and
//!   its versioned binary wire format.
//! - [`FlightGroup`] — at most one concurrent downstream execution per key;
//!   duplicate callers share the leader's outcome.
//! - [`CacheLayer`] — the middleware tying the above together, with
//!   fail-open store handling and off-path write-back (see
//!   [`crate::background::WriteBackQueue`]).
//! - [`CacheAdmin`] — invalidate / refresh / clear-by-prefix, plus the
//!   `POST /cache/*` endpoints that expose them.

pub mod admin;
pub mod capture;
pub mod flight;
pub mod key;
pub mod layer;
pub mod store;

pub use admin::{AdminOutcome, CacheAdmin};
pub use capture::{CachedResponse, DecodeError};
pub use flight::{Flight, FlightGroup, JoinError};
pub use key::{KEY_VERSION, NormalizeError, build_key, normalize_json};
pub use layer::{BYPASS_HEADER, CacheLayer, FROM_CACHE_HEADER};
pub use store::{CacheStore, MemoryStore, StoreError};

//! Captured responses and their persisted representation.
//!
//! A [`CachedResponse`] is an immutable snapshot of a finished downstream
//! response: status code, headers, body bytes. Snapshots are what the
//! single-flight leader shares with its waiters and what the write-back
//! queue persists to the store.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::http::{Response, StatusCode};

/// Format tag written as the first byte of every encoded payload. Bumped on
/// any layout change; payloads with a different tag are treated as misses.
const FORMAT_VERSION: u8 = 1;

/// A stored payload that cannot be decoded. The cache layer treats this as
/// a miss and re-executes the handler.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated cached response")]
    Truncated,

    #[error("unsupported cached response format {0}")]
    UnsupportedFormat(u8),

    #[error("cached header is not valid UTF-8")]
    InvalidHeader,

    #[error("cached status code {0} is not a known status")]
    UnknownStatus(u16),
}

/// An immutable snapshot of a captured HTTP response.
///
/// Multi-value headers collapse to their *first* entry — a deliberate,
/// lossy simplification: endpoints behind the cache are expected not to
/// emit meaningful multi-value headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl CachedResponse {
    /// Snapshots a finished response: final status, one value per header
    /// name, the complete body buffer. The response itself is untouched —
    /// the caller still receives exactly what the handler produced,
    /// however many chunks it was written in.
    pub fn capture(response: &Response) -> Self {
        let headers = response
            .headers()
            .first_entries()
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        Self {
            status: response.status().as_u16(),
            headers,
            body: Bytes::copy_from_slice(response.body_ref()),
        }
    }

    /// Recorded status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Recorded header snapshot (first value per name).
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Recorded body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Rebuilds a response to replay to a client.
    pub fn to_response(&self) -> Response {
        // Captured statuses always come from `StatusCode`, so the fallback
        // is unreachable for payloads that passed `decode`.
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::InternalServerError);
        let mut response = Response::new(status);
        for (name, value) in &self.headers {
            response.add_header(name.clone(), value.clone());
        }
        response.body_bytes(self.body.to_vec())
    }

    /// Serializes the snapshot for storage.
    ///
    /// Layout (all integers big-endian):
    ///
    /// ```text
    /// u8  format version
    /// u16 status
    /// u32 header count, then per header: u32 name len, name, u32 value len, value
    /// u64 body length, body
    /// ```
    pub fn encode(&self) -> Bytes {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(n, v)| 8 + n.len() + v.len())
            .sum();
        let mut buf = BytesMut::with_capacity(15 + header_bytes + self.body.len());

        buf.put_u8(FORMAT_VERSION);
        buf.put_u16(self.status);
        buf.put_u32(self.headers.len() as u32);
        for (name, value) in &self.headers {
            put_str(&mut buf, name);
            put_str(&mut buf, value);
        }
        buf.put_u64(self.body.len() as u64);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Deserializes a stored payload.
    ///
    /// # Errors
    ///
    /// [`DecodeError`] on truncation, a foreign format version, corrupt
    /// header text, or an unknown status code.
    pub fn decode(mut raw: Bytes) -> Result<Self, DecodeError> {
        if raw.remaining() < 1 {
            return Err(DecodeError::Truncated);
        }
        let format = raw.get_u8();
        if format != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedFormat(format));
        }

        if raw.remaining() < 2 {
            return Err(DecodeError::Truncated);
        }
        let status = raw.get_u16();
        if StatusCode::from_u16(status).is_none() {
            return Err(DecodeError::UnknownStatus(status));
        }

        if raw.remaining() < 4 {
            return Err(DecodeError::Truncated);
        }
        let header_count = raw.get_u32() as usize;
        let mut headers = Vec::with_capacity(header_count.min(64));
        for _ in 0..header_count {
            let name = get_str(&mut raw)?;
            let value = get_str(&mut raw)?;
            headers.push((name, value));
        }

        if raw.remaining() < 8 {
            return Err(DecodeError::Truncated);
        }
        let body_len = raw.get_u64() as usize;
        if raw.remaining() < body_len {
            return Err(DecodeError::Truncated);
        }
        let body = raw.split_to(body_len);

        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_str(raw: &mut Bytes) -> Result<String, DecodeError> {
    if raw.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    let len = raw.get_u32() as usize;
    if raw.remaining() < len {
        return Err(DecodeError::Truncated);
    }
    let bytes = raw.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidHeader)
}

//! Per-request connection scope handed to a [`Handler`].
//!
//! A scope describes one unit of work the server asks the application to
//! perform. HTTP scopes carry the request head and the fully collected body;
//! lifespan scopes carry nothing and are not subject to response tracking.
//!
//! [`Handler`]: crate::middleware::Handler

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, header};

/// Kind of work a [`Scope`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A single HTTP request/response exchange.
    Http,
    /// Server startup or shutdown notification.
    Lifespan,
}

/// Request context passed to handlers.
#[derive(Debug, Clone)]
pub struct Scope {
    kind: ScopeKind,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    peer: Option<SocketAddr>,
}

impl Scope {
    /// Build an HTTP scope.
    #[must_use]
    pub fn http(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            kind: ScopeKind::Http,
            method,
            path: path.into(),
            headers,
            body,
            peer: None,
        }
    }

    /// Build a lifespan scope.
    #[must_use]
    pub fn lifespan() -> Self {
        Self {
            kind: ScopeKind::Lifespan,
            method: Method::GET,
            path: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer: None,
        }
    }

    /// Attach the remote peer address.
    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind { self.kind }

    #[must_use]
    pub fn is_http(&self) -> bool { self.kind == ScopeKind::Http }

    #[must_use]
    pub fn method(&self) -> &Method { &self.method }

    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> { self.peer }

    /// Returns true if any `Accept` header value mentions `media_type`.
    ///
    /// Matching is a case-insensitive substring search over each
    /// comma-separated entry, ignoring parameters such as `q=`.
    #[must_use]
    pub fn accepts(&self, media_type: &str) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|entry| entry.split(';').next())
            .any(|entry| entry.trim().eq_ignore_ascii_case(media_type))
    }
}

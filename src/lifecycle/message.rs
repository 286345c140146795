//! Messages exchanged at the handler/transport boundary.

use std::{fmt, time::Instant};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Discriminant of a [`LifecycleMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `response.start`
    Start,
    /// `response.body`
    Body,
}

impl MessageKind {
    /// Protocol name of the message type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "response.start",
            Self::Body => "response.body",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A single response event emitted by a handler.
///
/// Messages are immutable once built; the tracking interceptor inspects them
/// by reference and forwards the same value to the transport.
#[derive(Debug, Clone)]
pub enum LifecycleMessage {
    /// The response head: status and headers.
    Start {
        status: StatusCode,
        headers: HeaderMap,
        at: Instant,
    },
    /// A chunk of the response body.
    Body {
        chunk: Bytes,
        more_body: bool,
        at: Instant,
    },
}

impl LifecycleMessage {
    /// Build a `response.start` message stamped with the current instant.
    #[must_use]
    pub fn start(status: StatusCode, headers: HeaderMap) -> Self {
        Self::Start {
            status,
            headers,
            at: Instant::now(),
        }
    }

    /// Build a `response.body` message stamped with the current instant.
    #[must_use]
    pub fn body(chunk: impl Into<Bytes>, more_body: bool) -> Self {
        Self::Body {
            chunk: chunk.into(),
            more_body,
            at: Instant::now(),
        }
    }

    /// Build the terminating `response.body` with no payload.
    #[must_use]
    pub fn end() -> Self { Self::body(Bytes::new(), false) }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Start { .. } => MessageKind::Start,
            Self::Body { .. } => MessageKind::Body,
        }
    }

    /// Whether further body chunks follow. Always `false` for a start.
    #[must_use]
    pub fn more_body(&self) -> bool { matches!(self, Self::Body { more_body: true, .. }) }

    /// Number of payload bytes carried. Zero for a start.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        match self {
            Self::Start { .. } => 0,
            Self::Body { chunk, .. } => chunk.len(),
        }
    }

    /// When the handler produced the message.
    #[must_use]
    pub fn at(&self) -> Instant {
        match self {
            Self::Start { at, .. } | Self::Body { at, .. } => *at,
        }
    }

    /// Returns true for the `response.body` that closes the response.
    #[must_use]
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Body { more_body: false, .. }) }
}

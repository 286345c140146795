//! Per-request response lifecycle state machine.
//!
//! A [`LifecycleTracker`] observes the messages a handler emits for one
//! request and, once the request ends, classifies the outcome. The result
//! depends only on the sequence of messages observed, never on timing.

use std::fmt;

use thiserror::Error;

use super::message::{LifecycleMessage, MessageKind};

/// Progress of a response through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// No `response.start` seen yet.
    NotStarted,
    /// Started, terminating body not yet seen.
    Started,
    /// A `response.body` with `more_body == false` was seen.
    Completed,
}

/// Final verdict for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Started and at least one body chunk was sent.
    Clean,
    /// Started but no body was ever sent.
    Violation,
    /// The handler never began a response.
    Idle,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Violation => "violation",
            Self::Idle => "idle",
        }
    }

    #[must_use]
    pub fn is_violation(self) -> bool { self == Self::Violation }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Reasons an observation was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ObserveError {
    /// The request was already classified.
    #[error("{0} observed after the request was classified")]
    Classified(MessageKind),
    /// A body chunk arrived before `response.start`.
    #[error("response.body observed before response.start")]
    BodyBeforeStart,
}

/// Snapshot of what has been observed for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    path: String,
    response_started: bool,
    body_sent: bool,
    message_count: usize,
    phase: Phase,
}

impl LifecycleState {
    fn new(path: String) -> Self {
        Self {
            path,
            response_started: false,
            body_sent: false,
            message_count: 0,
            phase: Phase::NotStarted,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    #[must_use]
    pub fn response_started(&self) -> bool { self.response_started }

    #[must_use]
    pub fn body_sent(&self) -> bool { self.body_sent }

    #[must_use]
    pub fn message_count(&self) -> usize { self.message_count }

    #[must_use]
    pub fn phase(&self) -> Phase { self.phase }
}

/// Tracks one request's response lifecycle and classifies it once.
///
/// ```
/// use http::{HeaderMap, StatusCode};
/// use ssetrace::lifecycle::{Classification, LifecycleMessage, LifecycleTracker};
///
/// let mut tracker = LifecycleTracker::new("/mcp");
/// tracker
///     .observe(&LifecycleMessage::start(StatusCode::OK, HeaderMap::new()))
///     .expect("start accepted");
/// assert_eq!(tracker.classify(), Classification::Violation);
/// ```
#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    state: LifecycleState,
    verdict: Option<Classification>,
}

impl LifecycleTracker {
    /// Create a tracker for the request at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            state: LifecycleState::new(path.into()),
            verdict: None,
        }
    }

    /// Record `message` and return the resulting phase.
    ///
    /// Only accepted messages are counted. A body chunk arriving before any
    /// start is rejected and does not increment
    /// [`message_count`](LifecycleState::message_count), so `body_sent`
    /// always implies `response_started`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserveError::Classified`] once [`classify`](Self::classify)
    /// has run, and [`ObserveError::BodyBeforeStart`] for a body chunk that
    /// precedes the start. Rejected messages leave the state unchanged.
    pub fn observe(&mut self, message: &LifecycleMessage) -> Result<Phase, ObserveError> {
        if self.verdict.is_some() {
            return Err(ObserveError::Classified(message.kind()));
        }
        let state = &mut self.state;
        match message.kind() {
            MessageKind::Start => {
                state.response_started = true;
                if state.phase == Phase::NotStarted {
                    state.phase = Phase::Started;
                }
            }
            MessageKind::Body => {
                if !state.response_started {
                    return Err(ObserveError::BodyBeforeStart);
                }
                state.body_sent = true;
                if message.is_terminal() {
                    state.phase = Phase::Completed;
                }
            }
        }
        state.message_count += 1;
        Ok(state.phase)
    }

    /// Classify the request, sealing the tracker.
    ///
    /// The verdict is computed on the first call; later calls return it
    /// unchanged.
    pub fn classify(&mut self) -> Classification {
        *self.verdict.get_or_insert_with(|| {
            match (self.state.response_started, self.state.body_sent) {
                (false, _) => Classification::Idle,
                (true, false) => Classification::Violation,
                (true, true) => Classification::Clean,
            }
        })
    }

    /// The verdict, if [`classify`](Self::classify) has run.
    #[must_use]
    pub fn classification(&self) -> Option<Classification> { self.verdict }

    #[must_use]
    pub fn state(&self) -> &LifecycleState { &self.state }

    #[must_use]
    pub fn phase(&self) -> Phase { self.state.phase }
}

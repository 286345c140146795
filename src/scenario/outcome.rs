//! Results of running a disconnect scenario.

use std::{fmt, time::Duration};

use thiserror::Error;

use super::Strategy;

/// The client-side signal that ended a scenario on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectSignal {
    /// A client deadline expired.
    Timeout,
    /// The reading task was aborted.
    Cancelled,
    /// The client dropped the response.
    Closed,
}

impl DisconnectSignal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for DisconnectSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Coarse category of a client transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Request,
    Body,
    Decode,
    Builder,
    Other,
}

impl TransportErrorKind {
    fn of(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_builder() {
            Self::Builder
        } else if err.is_body() {
            Self::Body
        } else if err.is_decode() {
            Self::Decode
        } else if err.is_request() {
            Self::Request
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Builder => "builder",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failure that is not one of the expected disconnect signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("{kind} error: {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("scenario task panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for ScenarioError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            kind: TransportErrorKind::of(&err),
            message: err.to_string(),
        }
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioTermination {
    /// The client disconnected as the strategy intended.
    ExpectedDisconnect(DisconnectSignal),
    /// The request finished before the client could disconnect.
    Completed,
    /// Something unexpected went wrong.
    Anomaly(ScenarioError),
}

impl ScenarioTermination {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExpectedDisconnect(_) => "expected_disconnect",
            Self::Completed => "completed",
            Self::Anomaly(_) => "anomaly",
        }
    }
}

/// Record of a single scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub strategy: Strategy,
    /// Response status, if the head arrived.
    pub status: Option<u16>,
    pub termination: ScenarioTermination,
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    /// True when the run ended through one of the strategy's expected
    /// disconnect signals.
    #[must_use]
    pub fn expected_signal_observed(&self) -> bool {
        matches!(self.termination, ScenarioTermination::ExpectedDisconnect(_))
    }

    #[must_use]
    pub fn is_anomalous(&self) -> bool {
        matches!(self.termination, ScenarioTermination::Anomaly(_))
    }

    #[must_use]
    pub fn signal(&self) -> Option<DisconnectSignal> {
        match self.termination {
            ScenarioTermination::ExpectedDisconnect(signal) => Some(signal),
            _ => None,
        }
    }
}

//! Client-side disconnect scenarios.
//!
//! A [`ScenarioDescriptor`] names one way of abandoning a streaming request.
//! The [`ScenarioRunner`] executes a descriptor against a server and reports
//! a [`ScenarioOutcome`]; the [`ScenarioSuite`] drives ordered steps of
//! scenarios, including concurrent bursts, and collects every outcome.

mod outcome;
pub mod payload;
mod runner;
mod suite;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::{
    outcome::{
        DisconnectSignal,
        ScenarioError,
        ScenarioOutcome,
        ScenarioTermination,
        TransportErrorKind,
    },
    runner::{RunnerConfig, STREAMING_ACCEPT, ScenarioRunner},
    suite::{
        DEFAULT_BURST,
        DEFAULT_SETTLE_DELAY,
        ScenarioSuite,
        SuiteError,
        SuiteReport,
        SuiteStep,
    },
};

/// When and how the client abandons the request.
///
/// Serialised externally tagged in `snake_case`, so a suite file spells a
/// delayed close as `{"delayed_ms": 200}` and the others as bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Read the response head and close at once, under a short deadline.
    Immediate,
    /// Read the response head, wait this many milliseconds, then close.
    DelayedMs(u64),
    /// Read the body on a separate task and abort that task almost at once.
    CancelDuringRead,
    /// Drop the response as soon as its head arrives.
    AbortDuringHandshake,
}

impl Strategy {
    /// Stable label without parameters, used for metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::DelayedMs(_) => "delayed_ms",
            Self::CancelDuringRead => "cancel_during_read",
            Self::AbortDuringHandshake => "abort_during_handshake",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DelayedMs(ms) => write!(f, "delayed_ms({ms})"),
            other => f.write_str(other.label()),
        }
    }
}

/// A named disconnect scenario and the JSON-RPC payload it sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub name: String,
    pub strategy: Strategy,
    #[serde(default = "payload::initialize_request")]
    pub request_payload: Value,
}

impl ScenarioDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, strategy: Strategy, request_payload: Value) -> Self {
        Self {
            name: name.into(),
            strategy,
            request_payload,
        }
    }
}

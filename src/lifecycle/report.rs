//! Classification reports and the sinks that receive them.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{error, info};

use super::tracker::{Classification, LifecycleState};

/// How the handler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The handler returned `Ok`.
    Returned,
    /// The handler returned an error.
    Errored(String),
    /// The handler panicked.
    Panicked,
    /// The handler future was dropped before completing.
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Returned => f.write_str("returned"),
            Self::Errored(message) => write!(f, "errored: {message}"),
            Self::Panicked => f.write_str("panicked"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one tracked request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    pub path: String,
    pub classification: Classification,
    pub response_started: bool,
    pub body_sent: bool,
    pub message_count: usize,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl LifecycleReport {
    pub(crate) fn new(
        state: &LifecycleState,
        classification: Classification,
        termination: Termination,
        elapsed: Duration,
    ) -> Self {
        Self {
            path: state.path().to_owned(),
            classification,
            response_started: state.response_started(),
            body_sent: state.body_sent(),
            message_count: state.message_count(),
            termination,
            elapsed,
        }
    }
}

/// Receives one report per tracked request.
///
/// Called from a drop guard, possibly while the handler task unwinds, so
/// implementations should be quick. A panicking reporter is caught and
/// logged by the caller.
pub trait Reporter: Send + Sync + 'static {
    fn report(&self, report: &LifecycleReport);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, report: &LifecycleReport) { (**self).report(report); }
}

/// Emits one `tracing` event per report.
///
/// Violations are logged at `error`, everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, report: &LifecycleReport) {
        let LifecycleReport {
            path,
            classification,
            message_count,
            termination,
            elapsed,
            ..
        } = report;
        match classification {
            Classification::Violation => error!(
                path = %path,
                classification = %classification,
                messages = message_count,
                termination = %termination,
                elapsed = ?elapsed,
                "response lifecycle violation: response.start sent but no response.body"
            ),
            Classification::Clean => info!(
                path = %path,
                classification = %classification,
                messages = message_count,
                termination = %termination,
                elapsed = ?elapsed,
                "response lifecycle completed"
            ),
            Classification::Idle => info!(
                path = %path,
                classification = %classification,
                termination = %termination,
                elapsed = ?elapsed,
                "response never started"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn report(classification: Classification) -> LifecycleReport {
        LifecycleReport {
            path: "/mcp".into(),
            classification,
            response_started: classification != Classification::Idle,
            body_sent: classification == Classification::Clean,
            message_count: 1,
            termination: Termination::Cancelled,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    #[traced_test]
    fn violation_is_logged_as_error() {
        LogReporter.report(&report(Classification::Violation));
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("response lifecycle violation"));
        assert!(logs_contain("path=/mcp"));
        assert!(logs_contain("termination=cancelled"));
    }

    #[test]
    #[traced_test]
    fn clean_and_idle_are_informational() {
        LogReporter.report(&report(Classification::Clean));
        LogReporter.report(&report(Classification::Idle));
        assert!(logs_contain("response lifecycle completed"));
        assert!(logs_contain("response never started"));
        assert!(!logs_contain("ERROR"));
    }
}

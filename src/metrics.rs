//! Metric helpers for `ssetrace`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::lifecycle::{Classification, MessageKind};

/// Gauge of requests whose lifecycle is currently being tracked.
pub const REQUESTS_ACTIVE: &str = "ssetrace_requests_active";
/// Counter of classified requests, labelled by `classification`.
pub const REQUESTS_CLASSIFIED: &str = "ssetrace_requests_classified_total";
/// Counter of lifecycle messages seen at the boundary, labelled by `kind`.
pub const LIFECYCLE_MESSAGES: &str = "ssetrace_lifecycle_messages_total";
/// Counter of finished scenario runs, labelled by `outcome`.
pub const SCENARIOS_TOTAL: &str = "ssetrace_scenarios_total";

pub fn inc_active_requests() {
    #[cfg(feature = "metrics")]
    gauge!(REQUESTS_ACTIVE).increment(1.0);
}

pub fn dec_active_requests() {
    #[cfg(feature = "metrics")]
    gauge!(REQUESTS_ACTIVE).decrement(1.0);
}

/// Record a request classification.
pub fn inc_classification(classification: Classification) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_CLASSIFIED, "classification" => classification.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = classification;
}

/// Record a message observed by the tracking interceptor.
pub fn inc_messages(kind: MessageKind) {
    #[cfg(feature = "metrics")]
    counter!(LIFECYCLE_MESSAGES, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a finished scenario run by its termination label.
pub fn inc_scenarios(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(SCENARIOS_TOTAL, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

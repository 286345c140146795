//! Response lifecycle tracking.
//!
//! Handlers describe a response as a `response.start` followed by one or
//! more `response.body` chunks, the last with `more_body == false`. This
//! module observes that sequence per request and flags requests that start a
//! response but never send a body.

mod interceptor;
mod message;
mod report;
mod tracker;

pub use interceptor::{ReportGuard, TrackingInterceptor, TrackingLayer};
pub use message::{LifecycleMessage, MessageKind};
pub use report::{LifecycleReport, LogReporter, Reporter, Termination};
pub use tracker::{Classification, LifecycleState, LifecycleTracker, ObserveError, Phase};

#![doc(html_root_url = "https://docs.rs/ssetrace/latest")]
//! Public API for the `ssetrace` library.
//!
//! This crate tracks the response lifecycle of streaming HTTP/SSE requests
//! at the boundary between a transport and an application handler, and
//! provides a harness that disconnects clients at controlled points in time
//! to expose requests that start a response but never finish it.

pub mod app;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod panic;
pub mod scenario;
pub mod scope;
pub mod server;
pub mod transport;

pub use error::{HandlerError, TransportError};
pub use lifecycle::{
    Classification,
    LifecycleMessage,
    LifecycleReport,
    LifecycleTracker,
    LogReporter,
    Reporter,
    Termination,
    TrackingInterceptor,
    TrackingLayer,
};
pub use middleware::{Handler, Next, Transform};
pub use scenario::{
    DisconnectSignal,
    ScenarioDescriptor,
    ScenarioOutcome,
    ScenarioRunner,
    ScenarioSuite,
    Strategy,
    SuiteReport,
};
pub use scope::{Scope, ScopeKind};
pub use transport::Transport;

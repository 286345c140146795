//! Utilities for exercising `ssetrace` handlers and servers in tests.
//!
//! [`MemoryTransport`] records the lifecycle messages a handler emits and can
//! simulate a client that disconnects or a transport that fails.
//! [`RecordingReporter`] collects lifecycle reports and lets a test wait for
//! them. [`ScriptedHandler`] replays a fixed message sequence and then ends in
//! a chosen way. [`TestServer`] runs a real server on a free local port.
//!
//! ```rust
//! use http::{HeaderMap, StatusCode};
//! use ssetrace::{Handler, LifecycleMessage, TrackingLayer};
//! use ssetrace_testing::{Ending, MemoryTransport, RecordingReporter, ScriptedHandler, http_scope};
//!
//! # async fn example() {
//! let reporter = RecordingReporter::default();
//! let script = [LifecycleMessage::start(StatusCode::OK, HeaderMap::new())];
//! let handler = TrackingLayer::with_reporter(reporter.clone())
//!     .wrap(ScriptedHandler::new(script, Ending::Return));
//! let mut transport = MemoryTransport::new();
//! handler
//!     .call(http_scope("/mcp"), &mut transport)
//!     .await
//!     .expect("handler succeeds");
//! assert!(reporter.reports()[0].classification.is_violation());
//! # }
//! ```

pub mod handler;
pub mod logging;
pub mod metrics;
pub mod reporter;
pub mod server;
pub mod transport;

pub use handler::{Ending, ScriptedHandler, http_scope};
pub use logging::{LoggerHandle, logger};
pub use reporter::RecordingReporter;
pub use server::{TestResult, TestServer, unused_listener};
pub use transport::{DisconnectHandle, MemoryTransport};

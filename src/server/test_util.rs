//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;

use super::{Bound, SseServer};
use crate::{
    app::{AppConfig, McpApp},
    middleware::Handler,
};

#[fixture]
pub fn app() -> McpApp { McpApp::new(AppConfig::default()) }

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents races where another process could
/// claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

pub fn bind_server<H: Handler>(handler: H, listener: StdTcpListener) -> SseServer<H, Bound> {
    SseServer::new(handler)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

//! A [`Handler`] that replays a fixed script.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use ssetrace::{Handler, HandlerError, LifecycleMessage, Scope, Transport};

/// How a [`ScriptedHandler`] finishes after sending its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    /// Return `Ok(())`.
    Return,
    /// Return an application error with this message.
    Fail(String),
    /// Panic with this message.
    Panic(&'static str),
    /// Never finish; the caller must drop the future.
    Hang,
    /// Return `Ok(())` once the client disconnects.
    AwaitDisconnect,
}

/// Sends every scripted message in order, then ends as configured.
///
/// Non-HTTP scopes return `Ok(())` without touching the transport. A failed
/// send ends the call early with the transport error.
#[derive(Debug)]
pub struct ScriptedHandler {
    script: Vec<LifecycleMessage>,
    ending: Ending,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(script: impl IntoIterator<Item = LifecycleMessage>, ending: Ending) -> Self {
        Self {
            script: script.into_iter().collect(),
            ending,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of HTTP scopes the handler has served.
    #[must_use]
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn call(&self, scope: Scope, transport: &mut dyn Transport) -> Result<(), HandlerError> {
        if !scope.is_http() {
            return Ok(());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        for message in self.script.iter().cloned() {
            transport.send(message).await?;
        }
        match &self.ending {
            Ending::Return => Ok(()),
            Ending::Fail(message) => Err(HandlerError::application(message.clone())),
            Ending::Panic(message) => panic!("{message}"),
            Ending::Hang => futures::future::pending().await,
            Ending::AwaitDisconnect => {
                transport.disconnected().await;
                Ok(())
            }
        }
    }
}

/// A `POST` HTTP scope for `path` with no headers or body.
#[must_use]
pub fn http_scope(path: &str) -> Scope { Scope::http(Method::POST, path, HeaderMap::new(), Bytes::new()) }

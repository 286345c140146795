//! Handler and middleware traits.
//!
//! A [`Handler`] serves one [`Scope`] by emitting lifecycle messages through
//! a [`Transport`]. A [`Transform`] wraps a handler in another handler, which
//! is how the tracking interceptor slots in between the server and the
//! application.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::HandlerError, scope::Scope, transport::Transport};

/// Application entry point invoked once per scope.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Serve `scope`, writing the response to `transport`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the response could not be produced or
    /// delivered.
    async fn call(&self, scope: Scope, transport: &mut dyn Transport) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn call(&self, scope: Scope, transport: &mut dyn Transport) -> Result<(), HandlerError> {
        (**self).call(scope, transport).await
    }
}

/// Continuation used by middleware to call the wrapped handler.
pub struct Next<'a, H>
where
    H: Handler + ?Sized,
{
    handler: &'a H,
}

impl<'a, H> Next<'a, H>
where
    H: Handler + ?Sized,
{
    /// Wrap a reference to the next handler in the chain.
    pub const fn new(handler: &'a H) -> Self { Self { handler } }

    /// Invoke the next handler.
    ///
    /// # Errors
    ///
    /// Propagates whatever the wrapped handler returns.
    pub async fn call(
        &self,
        scope: Scope,
        transport: &mut dyn Transport,
    ) -> Result<(), HandlerError> {
        self.handler.call(scope, transport).await
    }
}

/// Factory wrapping a handler with middleware.
#[async_trait]
pub trait Transform<H>: Send + Sync
where
    H: Handler,
{
    /// Handler produced by the middleware.
    type Output: Handler;

    /// Wrap `handler`.
    async fn transform(&self, handler: H) -> Self::Output;
}

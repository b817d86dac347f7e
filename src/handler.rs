//! Handler traits and type erasure.
//!
//! # Two handler shapes
//!
//! A route answers either over HTTP or, after a hijack, over a duplex
//! connection. Both are stored behind trait objects so the router can hold
//! handlers of different concrete types in one tree:
//!
//! ```text
//! async fn page(req: Request) -> Response { … }                      ← Handler
//! async fn echo(conn: DuplexConnection, req: Request) -> Result<…>  ← DuplexHandler
//!        ↓ into_boxed_*()
//! Arc<dyn Erased*>          ← one vtable dispatch per call
//! ```
//!
//! Both traits are **sealed**: only the blanket impls below satisfy them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::duplex::DuplexConnection;
use crate::error::HookError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a handler result.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Result<Response, HookError>>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedDuplexHandler {
    fn call(&self, conn: DuplexConnection, req: Request) -> BoxFuture<Result<(), HookError>>;
}

#[doc(hidden)]
pub type BoxedDuplexHandler = Arc<dyn ErasedDuplexHandler + Send + Sync + 'static>;

mod private {
    pub trait Sealed<Args> {}
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Implemented for every valid HTTP route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Returning `Result<_, HookError>` sends the error through `onError`.
pub trait Handler: private::Sealed<Request> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

impl<F, Fut, R> private::Sealed<Request> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Response, HookError>> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_result() })
    }
}

// ── DuplexHandler ─────────────────────────────────────────────────────────────

/// Implemented for every valid upgrade handler:
///
/// ```text
/// async fn name(conn: DuplexConnection, req: Request) -> Result<(), HookError>
/// ```
///
/// The handler owns the connection outright. An `Err` is logged and the
/// transport dropped: the HTTP error phases never see it.
pub trait DuplexHandler: private::Sealed<(DuplexConnection, Request)> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_duplex(self) -> BoxedDuplexHandler;
}

impl<F, Fut> private::Sealed<(DuplexConnection, Request)> for F
where
    F: Fn(DuplexConnection, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
}

impl<F, Fut> DuplexHandler for F
where
    F: Fn(DuplexConnection, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    fn into_boxed_duplex(self) -> BoxedDuplexHandler {
        Arc::new(FnDuplex(self))
    }
}

struct FnDuplex<F>(F);

impl<F, Fut> ErasedDuplexHandler for FnDuplex<F>
where
    F: Fn(DuplexConnection, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    fn call(&self, conn: DuplexConnection, req: Request) -> BoxFuture<Result<(), HookError>> {
        Box::pin((self.0)(conn, req))
    }
}

//! # handoff
//!
//! An HTTP request pipeline built from ordered hook phases, where a route can
//! take the connection over as a WebSocket partway through.
//!
//! ## The pipeline
//!
//! Every request walks the same phases, each one a list of hooks run in
//! registration order:
//!
//! ```text
//! onRequest → preParsing → preValidation → preHandler → handler
//!     → preSerialization → onSend            (onError / onTimeout on failure)
//! ```
//!
//! Any hook may finalize the reply, which ends the request as plain HTTP.
//! Any hook may fail, which runs `onError` once and answers with the
//! resulting reply (or a generic one).
//!
//! ## The handoff
//!
//! On an upgrade-eligible route a valid WebSocket upgrade request is
//! *hijacked* after `preValidation`. The `preHandler` hooks still run and can
//! still refuse over HTTP. After that the handshake is written, the HTTP
//! reply channel is gone for good, and the socket belongs to the route's
//! duplex handler. No serialization, send, timeout or error hook runs for
//! that request again.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use handoff::{DuplexConnection, HookError, Message, Phase, Request, Router, Server, Status};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), handoff::Error> {
//!     let app = Router::new().websocket("/echo", echo);
//!
//!     app.hooks().register_sync(Phase::PreValidation, |ctx| {
//!         if ctx.request().header("authorization").is_none() {
//!             if let Some(reply) = ctx.reply() {
//!                 reply.status(Status::Unauthorized).text("unauthorized");
//!             }
//!         }
//!         Ok(())
//!     })?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn echo(mut conn: DuplexConnection, _req: Request) -> Result<(), HookError> {
//!     while let Some(msg) = conn.recv().await {
//!         if let Message::Text(text) = msg? {
//!             conn.send_text(text.as_str()).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod boundary;
mod context;
mod decision;
mod duplex;
mod error;
mod handler;
mod handshake;
mod hijack;
mod hooks;
mod method;
mod request;
mod response;
mod router;
mod runner;
mod server;
mod status;

pub mod guard;

pub use context::Context;
pub use duplex::{DuplexConnection, Message};
pub use error::{Error, HandshakeError, HookError};
pub use handler::{DuplexHandler, Handler};
pub use hijack::HijackState;
pub use hooks::{Hook, HookFuture, Hooks, Phase};
pub use method::Method;
pub use request::Request;
pub use response::{IntoResponse, Reply, Response, ResponseBuilder};
pub use router::{Route, Router};
pub use server::Server;
pub use status::Status;

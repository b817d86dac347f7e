//! The error interception boundary.
//!
//! Wraps the whole phase sequence of a request. Whatever fails inside it,
//! a hook, the handler or the handshake, ends up here and is turned into
//! exactly one terminal action:
//!
//! - reply channel still valid (`NotHijacked`, or `Hijacking` with the
//!   socket not yet taken over): run `onError` (or `onTimeout`), then fall
//!   back to a generic reply if no hook finalized one;
//! - `Hijacked`: no hook runs and nothing is written. The connection is
//!   dropped, which the peer sees as an abrupt close.
//!
//! Failures never leave this boundary, so one request cannot take down the
//! connection task of another.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::guard;
use crate::hooks::{Phase, PhaseTable};
use crate::response::Response;
use crate::runner::{self, Progress, Terminal};

/// Runs a request to its terminal action.
///
/// `Err` means there is no HTTP reply to give: the peer went away, or the
/// transport no longer belongs to the HTTP layer. hyper then closes the
/// connection without writing anything.
pub(crate) async fn respond(
    table: &PhaseTable,
    ctx: &mut Context,
    deadline: Option<Duration>,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let result = match deadline {
        Some(d) => tokio::time::timeout(d, runner::run_request(table, ctx))
            .await
            .unwrap_or(Err(Error::Timeout(d))),
        None => runner::run_request(table, ctx).await,
    };

    match result {
        Ok(Terminal::HandedOff(res)) => Ok(res),
        Ok(Terminal::Replied) => finish(ctx),
        Err(Error::TransportClosed) => Err(Error::TransportClosed),
        Err(err) => {
            intercept(table, ctx, err, deadline).await?;
            finish(ctx)
        }
    }
}

/// Handles one failure. On return the context holds a finalized reply,
/// unless the request is past the handoff.
///
/// The error hooks run under their own `deadline`, so a hung one cannot hold
/// the request open.
async fn intercept(
    table: &PhaseTable,
    ctx: &mut Context,
    err: Error,
    deadline: Option<Duration>,
) -> Result<(), Error> {
    let phase = match err {
        Error::Timeout(_) => Phase::OnTimeout,
        _ => Phase::OnError,
    };
    if !guard::is_permitted(phase, ctx.hijack_state()) {
        debug!(error = %err, "failure after hijack, closing transport");
        return Err(Error::TransportClosed);
    }

    let status = err.status_code();
    if status >= 500 {
        warn!(status, error = %err, "request failed");
    } else {
        debug!(status, error = %err, "request failed");
    }

    // A failed hook may have half-built a reply; it is not trusted.
    ctx.reset_reply();
    ctx.set_error(err);

    let hooks = runner::run_phase(table, ctx, phase, Progress::UntilReplied);
    let result = match deadline {
        Some(d) => tokio::time::timeout(d, hooks).await.unwrap_or(Err(Error::Timeout(d))),
        None => hooks.await,
    };
    if let Err(e) = result {
        warn!(%phase, error = %e, "error hook failed, sending default reply");
        ctx.reset_reply();
    }
    if !ctx.is_replied() {
        ctx.set_response(Response::from_code(status));
    }
    Ok(())
}

fn finish(ctx: &mut Context) -> Result<http::Response<Full<Bytes>>, Error> {
    ctx.finish_reply()
        .map(Response::into_http)
        .ok_or(Error::TransportClosed)
}

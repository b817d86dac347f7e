//! The phase runner.
//!
//! Runs phases strictly in the order given and, within a phase, hooks
//! strictly in registration order (global hooks first, then the route's).
//! Each hook is awaited to completion before the next one starts.
//!
//! ```text
//! onRequest → preParsing → [body] → preValidation → ⟨decision point⟩
//!     → preHandler → handler → preSerialization → onSend
//! ```
//!
//! A failed hook stops everything and surfaces as `Err`. A hook that
//! finalizes the reply stops the pre-handler phases the same way, but as a
//! success: the reply is the terminal action.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use tracing::debug;

use crate::context::Context;
use crate::decision::{self, Decision};
use crate::error::Error;
use crate::guard;
use crate::hooks::{Phase, PhaseTable};
use crate::response::Response;
use crate::status::Status;

/// Whether phase progression may go on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Flow {
    Continue,
    Replied,
}

/// Whether a finalized reply ends the phase early.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Progress {
    UntilReplied,
    /// Serialization phases run over a reply that is already final.
    All,
}

/// How the normal (non-error) path of a request ended.
pub(crate) enum Terminal {
    Replied,
    HandedOff(http::Response<Full<Bytes>>),
}

pub(crate) async fn run_phase(
    table: &PhaseTable,
    ctx: &mut Context,
    phase: Phase,
    progress: Progress,
) -> Result<Flow, Error> {
    if !guard::is_permitted(phase, ctx.hijack_state()) {
        debug!(%phase, "phase suppressed after hijack");
        return Ok(Flow::Continue);
    }

    let route = ctx.route();
    let hooks = table.hooks_for(phase).iter().chain(route.hooks().hooks_for(phase));

    for hook in hooks {
        if let Err(e) = hook.call(ctx).await {
            debug!(%phase, error = %e, "hook failed");
            return Err(e.into());
        }
        if progress == Progress::UntilReplied && ctx.is_replied() {
            debug!(%phase, "reply finalized by hook");
            return Ok(Flow::Replied);
        }
    }
    Ok(Flow::Continue)
}

pub(crate) async fn run_phases(
    table: &PhaseTable,
    ctx: &mut Context,
    phases: &[Phase],
) -> Result<Flow, Error> {
    for &phase in phases {
        if ctx.is_replied() {
            return Ok(Flow::Replied);
        }
        if run_phase(table, ctx, phase, Progress::UntilReplied).await? == Flow::Replied {
            return Ok(Flow::Replied);
        }
    }
    Ok(Flow::Continue)
}

/// The whole non-error path of one request.
pub(crate) async fn run_request(table: &PhaseTable, ctx: &mut Context) -> Result<Terminal, Error> {
    if run_phases(table, ctx, &[Phase::OnRequest, Phase::PreParsing]).await? == Flow::Replied {
        return Ok(Terminal::Replied);
    }

    read_body(ctx).await?;

    if run_phases(table, ctx, &[Phase::PreValidation]).await? == Flow::Replied {
        return Ok(Terminal::Replied);
    }

    match decision::decide(table, ctx).await? {
        Decision::HandedOff(res) => return Ok(Terminal::HandedOff(res)),
        Decision::Replied => return Ok(Terminal::Replied),
        Decision::Continue => {}
    }

    if run_phases(table, ctx, &[Phase::PreHandler]).await? == Flow::Replied {
        return Ok(Terminal::Replied);
    }

    dispatch(ctx).await?;

    run_phase(table, ctx, Phase::PreSerialization, Progress::All).await?;
    run_phase(table, ctx, Phase::OnSend, Progress::All).await?;
    Ok(Terminal::Replied)
}

async fn read_body(ctx: &mut Context) -> Result<(), Error> {
    let Some(body) = ctx.take_body() else {
        return Ok(());
    };
    let collected = match ctx.body_limit() {
        Some(limit) => Limited::new(body, limit).collect().await.map_err(|e| {
            if e.is::<LengthLimitError>() {
                Error::BodyTooLarge(limit)
            } else {
                Error::TransportClosed
            }
        })?,
        None => body.collect().await.map_err(|_| Error::TransportClosed)?,
    };
    ctx.request_mut().set_body(collected.to_bytes());
    Ok(())
}

/// Runs the route's HTTP handler and installs its response as the reply.
async fn dispatch(ctx: &mut Context) -> Result<(), Error> {
    let route = ctx.route();
    let response = match route.http_handler() {
        Some(handler) => handler.call(ctx.request().clone()).await?,
        // upgrade-eligible route, plain request, no fallback handler
        None => Response::builder()
            .status(Status::UpgradeRequired)
            .header("upgrade", "websocket")
            .text("Upgrade Required"),
    };
    ctx.set_response(response);
    Ok(())
}

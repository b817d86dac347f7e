//! The hijack decision point.
//!
//! Runs once per request, after `preValidation` and before the route's
//! business logic. It is the only code that advances a request's
//! [`HijackState`](crate::HijackState).
//!
//! ```text
//! reply already final ─────────────▶ Replied   (normal HTTP completion)
//! route not upgrade-eligible ──────▶ Continue  (HTTP handler dispatch)
//! no upgrade requested ────────────▶ Continue
//! otherwise: NotHijacked → Hijacking
//!     preHandler hooks ── reply final ──▶ Replied
//!     handshake ── error ──▶ Err (boundary answers over HTTP)
//!     handshake ok: Hijacking → Hijacked, reply dropped, handler spawned
//!                                   ────▶ HandedOff(101)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::{Instrument, debug, warn};

use crate::context::Context;
use crate::duplex::DuplexConnection;
use crate::error::{Error, HandshakeError};
use crate::handler::BoxedDuplexHandler;
use crate::handshake;
use crate::hooks::{Phase, PhaseTable};
use crate::request::Request;
use crate::runner::{self, Flow};

pub(crate) enum Decision {
    Continue,
    Replied,
    HandedOff(http::Response<Full<Bytes>>),
}

pub(crate) async fn decide(table: &PhaseTable, ctx: &mut Context) -> Result<Decision, Error> {
    if ctx.is_replied() {
        return Ok(Decision::Replied);
    }
    let route = ctx.route();
    let Some(handler) = route.duplex_handler() else {
        return Ok(Decision::Continue);
    };
    if !ctx.is_upgrade_request() {
        return Ok(Decision::Continue);
    }

    let begun = ctx.hijack.begin();
    debug_assert!(begun, "hijack begun twice");
    debug!("hijacking");

    if runner::run_phases(table, ctx, &[Phase::PreHandler]).await? == Flow::Replied {
        return Ok(Decision::Replied);
    }

    let accepted = handshake::accept(ctx.request(), route.supported_protocols())?;
    let on_upgrade = ctx.take_upgrade().ok_or(HandshakeError::NotUpgradable)?;

    // The handoff. Nothing below awaits, so no other code of this request
    // can observe the transport as owned by both sides.
    ctx.relinquish_reply();
    let completed = ctx.hijack.complete();
    debug_assert!(completed, "hijack completed from {:?}", ctx.hijack_state());
    ctx.mark_handed_off();

    let request = ctx.request().clone();
    let protocol = accepted.protocol.clone();
    tokio::spawn(
        serve_duplex(on_upgrade, request, protocol, Arc::clone(handler)).in_current_span(),
    );

    Ok(Decision::HandedOff(handshake::switching_protocols(&accepted)))
}

/// Waits for hyper to release the socket, then gives it to the handler.
///
/// From here on nothing answers over HTTP. A handler error is logged and
/// the transport dropped with the handler's future, so the peer sees an
/// abnormal closure.
async fn serve_duplex(
    on_upgrade: OnUpgrade,
    request: Request,
    protocol: Option<String>,
    handler: BoxedDuplexHandler,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            debug!(error = %e, "peer gone before handoff completed");
            return;
        }
    };

    let conn = DuplexConnection::from_raw(TokioIo::new(upgraded), protocol).await;
    match handler.call(conn, request).await {
        Ok(()) => debug!("duplex handler finished"),
        Err(e) => warn!(error = %e, "duplex handler failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::HijackState;
    use crate::context::test_context;
    use crate::error::HookError;
    use crate::hooks::Hooks;
    use crate::method::Method;
    use crate::request::test_request;
    use crate::response::Response;
    use crate::router::Route;
    use crate::status::Status;

    async fn ws(_c: DuplexConnection, _r: Request) -> Result<(), HookError> {
        Ok(())
    }

    async fn page(_r: Request) -> Response {
        Response::text("page")
    }

    const UPGRADE: &[(&str, &str)] = &[
        ("connection", "Upgrade"),
        ("upgrade", "websocket"),
        ("sec-websocket-version", "13"),
        ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];

    #[tokio::test]
    async fn plain_routes_never_hijack() {
        let table = Hooks::new().freeze();
        let mut ctx = test_context(Route::http(page), test_request(Method::Get, "/", UPGRADE));
        assert!(matches!(decide(&table, &mut ctx).await, Ok(Decision::Continue)));
        assert_eq!(ctx.hijack_state(), HijackState::NotHijacked);
    }

    #[tokio::test]
    async fn finalized_reply_wins_over_eligibility() {
        let table = Hooks::new().freeze();
        let mut ctx = test_context(Route::duplex(ws), test_request(Method::Get, "/", UPGRADE));
        ctx.reply().unwrap().status(Status::NotFound).text("not found");

        assert!(matches!(decide(&table, &mut ctx).await, Ok(Decision::Replied)));
        assert_eq!(ctx.hijack_state(), HijackState::NotHijacked);
    }

    #[tokio::test]
    async fn pre_handler_runs_while_hijacking() {
        let hooks = Hooks::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        hooks
            .register_sync(Phase::PreHandler, move |ctx| {
                assert_eq!(ctx.hijack_state(), HijackState::Hijacking);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let table = hooks.freeze();

        // No hyper transport behind this context, so the handoff itself fails.
        let mut ctx = test_context(Route::duplex(ws), test_request(Method::Get, "/", UPGRADE));
        let err = decide(&table, &mut ctx).await.err().unwrap();

        assert!(matches!(err, Error::Handshake(HandshakeError::NotUpgradable)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.hijack_state(), HijackState::Hijacking);
        assert!(ctx.reply().is_some());
    }

    #[tokio::test]
    async fn malformed_upgrade_is_a_handshake_error() {
        let table = Hooks::new().freeze();
        let req = test_request(Method::Get, "/", &[("connection", "upgrade"), ("upgrade", "websocket")]);
        let mut ctx = test_context(Route::duplex(ws), req);

        let err = decide(&table, &mut ctx).await.err().unwrap();
        assert!(matches!(err, Error::Handshake(HandshakeError::UnsupportedVersion)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "hijack begun twice")]
    async fn hijack_cannot_begin_twice() {
        let table = Hooks::new().freeze();
        let mut ctx = test_context(Route::duplex(ws), test_request(Method::Get, "/", UPGRADE));
        ctx.hijack.begin();
        let _ = decide(&table, &mut ctx).await;
    }

    #[tokio::test]
    async fn pre_handler_reply_aborts_the_hijack() {
        let hooks = Hooks::new();
        hooks
            .register_sync(Phase::PreHandler, |ctx| {
                if let Some(reply) = ctx.reply() {
                    reply.status(Status::Unauthorized).text("unauthorized");
                }
                Ok(())
            })
            .unwrap();
        let table = hooks.freeze();

        let mut ctx = test_context(Route::duplex(ws), test_request(Method::Get, "/", UPGRADE));
        assert!(matches!(decide(&table, &mut ctx).await, Ok(Decision::Replied)));
        assert_ne!(ctx.hijack_state(), HijackState::Hijacked);
        assert_eq!(ctx.finish_reply().unwrap().status_code(), 401);
    }
}

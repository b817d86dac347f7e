//! Per-request context passed through the hook chain.

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use tracing::debug;

use crate::error::Error;
use crate::hijack::{Hijack, HijackState};
use crate::request::Request;
use crate::response::{Reply, Response};
use crate::router::Route;

/// How a request's lifecycle ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
    Responded,
    HandedOff,
}

/// Everything a hook can see and touch for one request.
///
/// A context is owned by exactly one request task. Hooks receive it by
/// `&mut` one at a time, strictly in phase and registration order.
pub struct Context {
    request: Request,
    route: Arc<Route>,
    reply: Option<Reply>,
    /// Advanced by the hijack decision point only.
    pub(crate) hijack: Hijack,
    error: Option<Error>,
    extensions: http::Extensions,
    body: Option<Incoming>,
    body_limit: Option<usize>,
    on_upgrade: Option<OnUpgrade>,
    outcome: Option<Outcome>,
}

impl Context {
    pub(crate) fn new(request: Request, route: Arc<Route>) -> Self {
        Self {
            request,
            route,
            reply: Some(Reply::new()),
            hijack: Hijack::default(),
            error: None,
            extensions: http::Extensions::new(),
            body: None,
            body_limit: None,
            on_upgrade: None,
            outcome: None,
        }
    }

    pub(crate) fn with_transport(mut self, body: Incoming, on_upgrade: OnUpgrade) -> Self {
        self.body = Some(body);
        self.on_upgrade = Some(on_upgrade);
        self
    }

    /// Caps how much of the body is buffered before `preValidation`.
    pub(crate) fn with_body_limit(mut self, limit: Option<usize>) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The reply capability. `None` once the request has been hijacked.
    pub fn reply(&mut self) -> Option<&mut Reply> {
        self.reply.as_mut()
    }

    /// Whether a reply has been finalized. The decision point and the error
    /// boundary both consult this one flag.
    pub fn is_replied(&self) -> bool {
        self.reply.as_ref().is_some_and(Reply::is_sent)
    }

    pub fn hijack_state(&self) -> HijackState {
        self.hijack.state()
    }

    /// The failure being handled. Set while `onError` hooks run.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_upgrade_request(&self) -> bool {
        self.request.is_upgrade()
    }

    pub fn is_upgrade_eligible(&self) -> bool {
        self.route.is_upgrade_eligible()
    }

    /// Typed per-request storage for passing data between hooks.
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    // ── crate-internal plumbing ───────────────────────────────────────────────

    pub(crate) fn route(&self) -> Arc<Route> {
        Arc::clone(&self.route)
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub(crate) fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub(crate) fn take_body(&mut self) -> Option<Incoming> {
        self.body.take()
    }

    pub(crate) fn body_limit(&self) -> Option<usize> {
        self.body_limit
    }

    pub(crate) fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.on_upgrade.take()
    }

    /// Drops the reply capability. Called at the instant of handoff.
    pub(crate) fn relinquish_reply(&mut self) {
        self.reply = None;
    }

    /// Starts the reply over, discarding what a failed hook may have built.
    pub(crate) fn reset_reply(&mut self) {
        if self.reply.is_some() {
            self.reply = Some(Reply::new());
        }
    }

    /// Installs a handler's response as the pending reply.
    pub(crate) fn set_response(&mut self, response: Response) {
        if let Some(reply) = self.reply.as_mut() {
            reply.send_response(response);
        }
    }

    /// Takes the reply for the wire, marking the request responded.
    pub(crate) fn finish_reply(&mut self) -> Option<Response> {
        let reply = self.reply.take()?;
        self.outcome = Some(Outcome::Responded);
        Some(reply.into_response())
    }

    pub(crate) fn mark_handed_off(&mut self) {
        self.outcome = Some(Outcome::HandedOff);
    }

    #[cfg(test)]
    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Reached when the peer disconnects and hyper cancels the request
        // future mid-hook: nothing is written, nothing else is affected.
        if self.outcome.is_none() {
            debug!(
                method = %self.request.method(),
                path = self.request.path(),
                "request abandoned before a terminal action"
            );
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(route: Route, request: Request) -> Context {
    Context::new(request, Arc::new(route))
}

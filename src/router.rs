//! Radix-tree request router and route definitions.
//!
//! One tree per HTTP method, O(path-length) lookup. A route either answers
//! over HTTP or is upgrade-eligible: its handler then receives a
//! [`DuplexConnection`](crate::DuplexConnection) instead of a reply.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::context::Context;
use crate::handler::{BoxedDuplexHandler, BoxedHandler, DuplexHandler, Handler};
use crate::hooks::{HookFuture, Hooks, Phase, PhaseTable};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

// ── Route ─────────────────────────────────────────────────────────────────────

/// A route definition. Immutable once registered.
///
/// ```rust,no_run
/// use handoff::{DuplexConnection, HookError, Method, Phase, Request, Response, Route, Router};
///
/// async fn chat(mut conn: DuplexConnection, _req: Request) -> Result<(), HookError> {
///     conn.send_text("welcome").await?;
///     conn.close().await?;
///     Ok(())
/// }
///
/// async fn chat_page(_req: Request) -> Response {
///     Response::text("open this page with a WebSocket client")
/// }
///
/// let app = Router::new().route(
///     Method::Get,
///     "/chat",
///     Route::duplex(chat)
///         .fallback(chat_page)
///         .protocols(["chat.v1"])
///         .hook(Phase::PreHandler, |_ctx| Box::pin(async { Ok(()) })),
/// );
/// ```
pub struct Route {
    http: Option<BoxedHandler>,
    duplex: Option<BoxedDuplexHandler>,
    protocols: Vec<String>,
    hooks: PhaseTable,
}

impl Route {
    /// A plain HTTP route.
    pub fn http(handler: impl Handler) -> Self {
        Self {
            http: Some(handler.into_boxed_handler()),
            duplex: None,
            protocols: Vec::new(),
            hooks: PhaseTable::default(),
        }
    }

    /// An upgrade-eligible route.
    pub fn duplex(handler: impl DuplexHandler) -> Self {
        Self {
            http: None,
            duplex: Some(handler.into_boxed_duplex()),
            protocols: Vec::new(),
            hooks: PhaseTable::default(),
        }
    }

    /// HTTP handler for requests that do not ask for an upgrade. Without one,
    /// an upgrade-eligible route answers them with `426 Upgrade Required`.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.http = Some(handler.into_boxed_handler());
        self
    }

    /// Subprotocols this route accepts, in no particular order.
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// A route-scoped hook. It runs after the global hooks of the same phase.
    pub fn hook<F>(mut self, phase: Phase, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.hooks.push(phase, Arc::new(hook));
        self
    }

    pub fn is_upgrade_eligible(&self) -> bool {
        self.duplex.is_some()
    }

    pub(crate) fn http_handler(&self) -> Option<&BoxedHandler> {
        self.http.as_ref()
    }

    pub(crate) fn duplex_handler(&self) -> Option<&BoxedDuplexHandler> {
        self.duplex.as_ref()
    }

    pub(crate) fn supported_protocols(&self) -> &[String] {
        &self.protocols
    }

    pub(crate) fn hooks(&self) -> &PhaseTable {
        &self.hooks
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
    fallback: Arc<Route>,
    hooks: Hooks,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: Arc::new(Route::http(not_found)),
            hooks: Hooks::new(),
        }
    }

    /// Register an HTTP handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(method, path, Route::http(handler))
    }

    /// Register an upgrade-eligible `GET` route.
    pub fn websocket(self, path: &str, handler: impl DuplexHandler) -> Self {
        self.route(Method::Get, path, Route::duplex(handler))
    }

    /// Register a fully built [`Route`].
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with an existing
    /// route. Routes are registered at startup, so this fails fast.
    pub fn route(mut self, method: Method, path: &str, route: Route) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(route))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Handle to the phase registry shared by every route of this router.
    pub fn hooks(&self) -> Hooks {
        self.hooks.clone()
    }

    /// Matches a request. Unmatched paths resolve to the `404` fallback route
    /// so the global hook chain still runs for them.
    pub(crate) fn lookup(&self, method: Method, path: &str) -> (Arc<Route>, HashMap<String, String>) {
        let matched = self.routes.get(&method).and_then(|tree| tree.at(path).ok());
        match matched {
            Some(m) => {
                let params = m.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                (Arc::clone(m.value), params)
            }
            None => (Arc::clone(&self.fallback), HashMap::new()),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::from_code(Status::NotFound.into())
}

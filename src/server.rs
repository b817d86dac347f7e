//! HTTP server and graceful shutdown.
//!
//! # Setup, then serving
//!
//! [`Server::serve`] freezes the router's phase registry before the first
//! connection is accepted. From then on hook registration fails with a
//! configuration error and every request reads the frozen table lock-free.
//!
//! # Graceful shutdown
//!
//! On SIGTERM / Ctrl-C (or the future given to
//! [`serve_with_shutdown`](Server::serve_with_shutdown)) the server:
//! 1. Immediately stops `listener.accept()`.
//! 2. Lets every in-flight HTTP connection task run to completion.
//! 3. Returns from `serve`.
//!
//! Hijacked connections belong to their duplex handlers and are not part of
//! the drain: their tasks keep running until the handler returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, debug_span, error, info};

use crate::boundary;
use crate::context::Context;
use crate::error::Error;
use crate::hooks::PhaseTable;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

/// Default cap on a buffered request body.
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

enum Listen {
    Addr(SocketAddr),
    Bound(TcpListener),
}

/// The HTTP server.
pub struct Server {
    listen: Listen,
    request_timeout: Option<Duration>,
    body_limit: Option<usize>,
}

/// What every connection task shares.
struct App {
    router: Router,
    table: Arc<PhaseTable>,
    request_timeout: Option<Duration>,
    body_limit: Option<usize>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use handoff::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self::new(Listen::Addr(addr))
    }

    /// Serves on an already bound listener, e.g. one on port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self::new(Listen::Bound(listener))
    }

    fn new(listen: Listen) -> Self {
        Self { listen, request_timeout: None, body_limit: Some(DEFAULT_BODY_LIMIT) }
    }

    /// Deadline for a request to reach its terminal action. A request still
    /// running its hooks when it expires gets the `onTimeout` phase and a
    /// `408`. Hijacked connections are not subject to it.
    ///
    /// `onError` and `onTimeout` hooks get a fresh budget of the same length;
    /// one that overruns it is abandoned and the default error reply is sent.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Largest request body, in bytes, buffered before `preValidation`.
    /// A bigger body fails the request with `413 Payload Too Large`.
    /// Defaults to 2 MiB.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Bound(listener) => listener,
        };
        let addr = listener.local_addr()?;

        let table = router.hooks().freeze();
        let app = Arc::new(App {
            router,
            table,
            request_timeout: self.request_timeout,
            body_limit: self.body_limit,
        });

        info!(addr = %addr, "handoff listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting, even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr).await }
                        });

                        // `with_upgrades` keeps the socket alive past a 101
                        // so it can be handed to the duplex handler.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection_with_upgrades(io, svc)
                            .await
                        {
                            // Abandoned requests and peer resets end up here.
                            debug!(peer = %remote_addr, "connection closed: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("handoff stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Builds the request context and runs it through the error boundary.
///
/// An `Err` tells hyper to drop the connection without writing: there is no
/// HTTP reply left to give for this request.
async fn dispatch(
    app: Arc<App>,
    mut req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(Response::from_code(Status::MethodNotAllowed.into()).into_http());
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    let (parts, body) = req.into_parts();
    let (route, params) = app.router.lookup(method, parts.uri.path());

    let span = debug_span!("request", %method, path = parts.uri.path(), peer = %remote_addr);
    let request = Request::new(method, &parts.uri, parts.version, parts.headers, params, remote_addr);
    let mut ctx = Context::new(request, route)
        .with_transport(body, on_upgrade)
        .with_body_limit(app.body_limit);

    boundary::respond(&app.table, &mut ctx, app.request_timeout)
        .instrument(span)
        .await
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

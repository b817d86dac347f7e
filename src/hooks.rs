//! Lifecycle phases and the phase registry.
//!
//! # Setup stage vs. serving stage
//!
//! Hooks are registered through a [`Hooks`] handle obtained from
//! [`Router::hooks`](crate::Router::hooks). Any collaborator holding a clone
//! may register on any phase until the server starts. `Server::serve` then
//! freezes the registry: the phase table moves into an `Arc` that every
//! request reads without locking, and any later registration fails with
//! [`Error::Configuration`].
//!
//! ```rust
//! use handoff::{Phase, Router};
//!
//! let app = Router::new();
//! let hooks = app.hooks();
//!
//! hooks.register(Phase::OnRequest, |ctx| Box::pin(async move {
//!     tracing::debug!(path = ctx.request().path(), "incoming");
//!     Ok(())
//! })).unwrap();
//!
//! hooks.register_sync(Phase::PreValidation, |ctx| {
//!     if ctx.request().header("x-token").is_none() {
//!         if let Some(reply) = ctx.reply() {
//!             reply.status(handoff::Status::Unauthorized).text("unauthorized");
//!         }
//!     }
//!     Ok(())
//! }).unwrap();
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{Error, HookError};

// ── Phase ─────────────────────────────────────────────────────────────────────

/// A named stage of the request pipeline. The set is fixed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    OnRequest,
    PreParsing,
    PreValidation,
    PreHandler,
    PreSerialization,
    OnSend,
    OnError,
    OnTimeout,
}

impl Phase {
    /// Every phase, in pipeline order.
    pub const ALL: [Phase; 8] = [
        Phase::OnRequest,
        Phase::PreParsing,
        Phase::PreValidation,
        Phase::PreHandler,
        Phase::PreSerialization,
        Phase::OnSend,
        Phase::OnError,
        Phase::OnTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnRequest        => "onRequest",
            Self::PreParsing       => "preParsing",
            Self::PreValidation    => "preValidation",
            Self::PreHandler       => "preHandler",
            Self::PreSerialization => "preSerialization",
            Self::OnSend           => "onSend",
            Self::OnError          => "onError",
            Self::OnTimeout        => "onTimeout",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("unknown phase `{s}`")))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Hook ──────────────────────────────────────────────────────────────────────

/// The future a hook returns. It borrows the request context for as long
/// as it runs; the runner awaits it before starting the next hook.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'a>>;

/// A function executed at a specific phase.
///
/// Implemented for every closure `Fn(&mut Context) -> HookFuture<'_>`.
/// Implement it on your own types for stateful hooks.
pub trait Hook: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> HookFuture<'a>;
}

impl<F> Hook for F
where
    F: for<'a> Fn(&'a mut Context) -> HookFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> HookFuture<'a> {
        (self)(ctx)
    }
}

/// A synchronous hook body lifted into the asynchronous contract.
struct SyncHook<F>(F);

impl<F> Hook for SyncHook<F>
where
    F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> HookFuture<'a> {
        let result = (self.0)(ctx);
        Box::pin(std::future::ready(result))
    }
}

pub(crate) type BoxedHook = Arc<dyn Hook>;

// ── PhaseTable ────────────────────────────────────────────────────────────────

/// Ordered hooks for every phase.
#[derive(Clone, Default)]
pub(crate) struct PhaseTable {
    hooks: [Vec<BoxedHook>; 8],
}

impl PhaseTable {
    pub(crate) fn push(&mut self, phase: Phase, hook: BoxedHook) {
        self.hooks[phase.index()].push(hook);
    }

    pub(crate) fn hooks_for(&self, phase: Phase) -> &[BoxedHook] {
        &self.hooks[phase.index()]
    }
}

// ── Hooks (registry handle) ───────────────────────────────────────────────────

struct Registry {
    pending: Mutex<PhaseTable>,
    frozen: OnceLock<Arc<PhaseTable>>,
}

/// Handle to a router's phase registry. Clones share the same registry.
#[derive(Clone)]
pub struct Hooks {
    inner: Arc<Registry>,
}

impl Hooks {
    pub(crate) fn new() -> Self {
        let inner = Registry { pending: Mutex::new(PhaseTable::default()), frozen: OnceLock::new() };
        Self { inner: Arc::new(inner) }
    }

    /// Appends an asynchronous hook to `phase`.
    ///
    /// The closure must return a boxed future, which is what lets it borrow
    /// the context across `.await` points:
    ///
    /// ```rust
    /// # use handoff::{Phase, Router};
    /// # let hooks = Router::new().hooks();
    /// hooks.register(Phase::PreHandler, |_ctx| Box::pin(async move {
    ///     tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    ///     Ok(())
    /// })).unwrap();
    /// ```
    pub fn register<F>(&self, phase: Phase, hook: F) -> Result<&Self, Error>
    where
        F: for<'a> Fn(&'a mut Context) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.insert(phase, Arc::new(hook))
    }

    /// Appends a synchronous hook to `phase`.
    pub fn register_sync<F>(&self, phase: Phase, hook: F) -> Result<&Self, Error>
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.insert(phase, Arc::new(SyncHook(hook)))
    }

    /// Appends a [`Hook`] implementation to `phase`.
    pub fn register_hook(&self, phase: Phase, hook: impl Hook) -> Result<&Self, Error> {
        self.insert(phase, Arc::new(hook))
    }

    fn insert(&self, phase: Phase, hook: BoxedHook) -> Result<&Self, Error> {
        let mut pending = self.inner.pending.lock();
        if self.inner.frozen.get().is_some() {
            return Err(Error::configuration(format!(
                "cannot register a `{phase}` hook after the server started"
            )));
        }
        pending.push(phase, hook);
        Ok(self)
    }

    /// The hooks registered for `phase`, in registration order.
    pub fn hooks_for(&self, phase: Phase) -> Vec<Arc<dyn Hook>> {
        match self.inner.frozen.get() {
            Some(table) => table.hooks_for(phase).to_vec(),
            None => self.inner.pending.lock().hooks_for(phase).to_vec(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get().is_some()
    }

    /// Ends the setup stage. Idempotent: later calls return the same table.
    pub(crate) fn freeze(&self) -> Arc<PhaseTable> {
        let mut pending = self.inner.pending.lock();
        let table = self
            .inner
            .frozen
            .get_or_init(|| Arc::new(std::mem::take(&mut *pending)));
        Arc::clone(table)
    }
}

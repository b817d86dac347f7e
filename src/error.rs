//! Unified error types.
//!
//! [`Error`] is what the pipeline records on a [`Context`](crate::Context) and
//! what the crate's fallible operations return. [`HookError`] is what hook and
//! handler bodies return: any `std::error::Error` converts into it with `?`.

use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by handoff's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding or accepting on the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A hook or handler body failed.
    #[error("{0}")]
    Hook(HookError),

    /// The request asked for an upgrade but did not satisfy its preconditions.
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// Invalid setup, e.g. registering a hook after the server started.
    #[error("configuration: {0}")]
    Configuration(String),

    /// The duplex protocol engine failed after handoff.
    #[error("duplex: {0}")]
    Duplex(#[from] tungstenite::Error),

    /// The request body exceeded the configured limit (in bytes).
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// The request pipeline ran past the configured deadline.
    #[error("request exceeded {0:?}")]
    Timeout(Duration),

    /// The peer went away. Never answered, only abandoned.
    #[error("transport closed by peer")]
    TransportClosed,
}

impl From<HookError> for Error {
    fn from(e: HookError) -> Self {
        Self::Hook(e)
    }
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// HTTP status the default error reply uses for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Hook(e) => e.status().unwrap_or(500),
            Self::Handshake(_) => 400,
            Self::Timeout(_) => 408,
            Self::BodyTooLarge(_) => 413,
            _ => 500,
        }
    }
}

// ── HookError ─────────────────────────────────────────────────────────────────

/// Failure raised by a hook or route handler.
///
/// Carries an optional HTTP status. Without one the default error reply is
/// `500 Internal Server Error`.
///
/// ```rust
/// use handoff::HookError;
///
/// let e = HookError::with_status(401, "missing token");
/// assert_eq!(e.status(), Some(401));
///
/// fn parse(raw: &str) -> Result<u32, HookError> {
///     Ok(raw.parse::<u32>()?)
/// }
/// assert!(parse("x").is_err());
/// ```
pub struct HookError {
    status: Option<u16>,
    source: BoxError,
}

impl HookError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self { status: None, source: source.into() }
    }

    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(Message(msg.into()))
    }

    pub fn with_status(status: u16, msg: impl Into<String>) -> Self {
        Self { status: Some(status), source: Box::new(Message(msg.into())) }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

/// Lets hook bodies use `?` on any standard error.
///
/// `HookError` must not implement `std::error::Error` itself: this impl would
/// then overlap with `From<T> for T`.
impl<E> From<E> for HookError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self::new(e)
    }
}

impl fmt::Debug for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookError")
            .field("status", &self.status)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "hook failed ({code}): {}", self.source),
            None => write!(f, "hook failed: {}", self.source),
        }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

// ── HandshakeError ────────────────────────────────────────────────────────────

/// Why an upgrade request was refused before the socket was taken over.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("upgrade requires GET, got {0}")]
    Method(String),
    #[error("upgrade requires HTTP/1.1")]
    Version,
    #[error("missing `connection: upgrade`")]
    MissingConnectionUpgrade,
    #[error("unsupported upgrade protocol `{0}`")]
    Protocol(String),
    #[error("unsupported sec-websocket-version")]
    UnsupportedVersion,
    #[error("missing or malformed sec-websocket-key")]
    InvalidKey,
    #[error("connection cannot be upgraded")]
    NotUpgradable,
}

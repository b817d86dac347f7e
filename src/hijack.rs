//! Per-request hijack state.
//!
//! The state only moves forward:
//!
//! ```text
//! NotHijacked ──begin──▶ Hijacking ──complete──▶ Hijacked
//! ```
//!
//! A failed handshake leaves the request in `Hijacking`: the socket was never
//! taken over, so the reply channel is still valid and the error boundary
//! answers over HTTP. Only the hijack decision point (`decision.rs`) calls
//! the transition methods; everything else reads the state.

/// Where a request stands relative to the protocol handoff.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HijackState {
    #[default]
    NotHijacked,
    /// The route is upgrade-eligible and the request asked for an upgrade;
    /// pre-dispatch hooks and the handshake are in progress.
    Hijacking,
    /// The duplex handler owns the transport.
    Hijacked,
}

/// Monotonic holder for a request's [`HijackState`].
#[derive(Debug, Default)]
pub(crate) struct Hijack {
    state: HijackState,
}

impl Hijack {
    pub(crate) fn state(&self) -> HijackState {
        self.state
    }

    /// `NotHijacked → Hijacking`. Returns `false` from any other state.
    pub(crate) fn begin(&mut self) -> bool {
        if self.state != HijackState::NotHijacked {
            return false;
        }
        self.state = HijackState::Hijacking;
        true
    }

    /// `Hijacking → Hijacked`. Returns `false` from any other state.
    pub(crate) fn complete(&mut self) -> bool {
        if self.state != HijackState::Hijacking {
            return false;
        }
        self.state = HijackState::Hijacked;
        true
    }
}

//! Post-hijack guard: which phases may still run for a request.

use crate::hijack::HijackState;
use crate::hooks::Phase;

/// Whether hooks of `phase` may run in `state`.
///
/// Once a request is `Hijacked` there is no HTTP response to serialize or
/// send, no HTTP request timeout to report and no reply channel to answer an
/// error on. Those phases are refused even if hooks are registered for them.
pub fn is_permitted(phase: Phase, state: HijackState) -> bool {
    match state {
        HijackState::Hijacked => !matches!(
            phase,
            Phase::PreSerialization | Phase::OnSend | Phase::OnTimeout | Phase::OnError
        ),
        HijackState::NotHijacked | HijackState::Hijacking => true,
    }
}

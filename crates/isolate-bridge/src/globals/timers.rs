//! `setTimeout`/`setInterval`/`clearTimeout`/`clearInterval` (spec.md §4.3,
//! §4.8 "Timers"). A thin guest-facing skin over `isolate_core::TimerQueue`:
//! this module holds no state of its own, since the queue already lives on
//! the owning `Isolate`.

use isolate_core::{TimerId, TimerKind, TimerQueue};
use isolate_protocol::CallbackId;

/// `setTimeout(callback, delay)`.
pub fn set_timeout(queue: &mut TimerQueue, delay_ms: u64, callback_id: CallbackId) -> TimerId {
    queue.schedule(TimerKind::OneShot, delay_ms, callback_id)
}

/// `setInterval(callback, delay)`.
pub fn set_interval(queue: &mut TimerQueue, delay_ms: u64, callback_id: CallbackId) -> TimerId {
    queue.schedule(TimerKind::Periodic, delay_ms, callback_id)
}

/// `clearTimeout(id)` / `clearInterval(id)`. A no-op for an unknown or
/// already-fired one-shot id (spec.md §4.8).
pub fn clear(queue: &mut TimerQueue, id: TimerId) {
    queue.clear(id);
}

/// Drives virtual time forward by `delta_ms`, invoking `dispatch` once per
/// fired timer in scheduled order, interleaved with `queue.pop_due` so a
/// timer scheduled from inside a callback and due within the same window is
/// still picked up (spec.md §4.8 "nested scheduling").
pub fn tick(queue: &mut TimerQueue, delta_ms: u64, mut dispatch: impl FnMut(CallbackId)) {
    let deadline = queue.now() + delta_ms;
    while let Some(fired) = queue.pop_due(deadline) {
        dispatch(fired.callback_id);
    }
    queue.advance_to(deadline);
}

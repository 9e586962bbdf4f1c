//! Virtual-time timer dispatch (spec.md §4.8): the guest registers a
//! callback through `op_set_timer`/`op_clear_timer` (`crate::ops`); this
//! module holds the resulting `v8::Global<Function>` handles and fires them
//! when the host drives `tick(ms)`.

use std::collections::HashMap;

use deno_core::{v8, JsRuntime};
use isolate_core::{Isolate, TimerQueue};
use isolate_protocol::CallbackId;

use crate::error::EngineError;
use crate::invoke::call_guest_function;

pub type GuestTimerCallbacks = HashMap<CallbackId, v8::Global<v8::Function>>;

/// Advances the isolate's virtual clock by `delta_ms` and fires every timer
/// that becomes due, in scheduled-time order (spec.md §4.8). Errors from an
/// individual callback are collected rather than aborting the rest of the
/// tick -- per spec.md §7, "errors in timer callbacks ... do not stop the
/// timer queue".
pub async fn tick(
    runtime: &mut JsRuntime,
    record: &mut Isolate,
    callbacks: &GuestTimerCallbacks,
    delta_ms: u64,
) -> Vec<EngineError> {
    let due = due_callback_ids(&mut record.timers, delta_ms);
    let mut errors = Vec::new();
    for callback_id in due {
        let Some(function) = callbacks.get(&callback_id) else {
            continue;
        };
        if let Err(err) = call_guest_function(runtime, function, &[]).await {
            errors.push(err);
        }
    }
    errors
}

fn due_callback_ids(queue: &mut TimerQueue, delta_ms: u64) -> Vec<CallbackId> {
    let deadline = queue.now() + delta_ms;
    let mut fired = Vec::new();
    while let Some(entry) = queue.pop_due(deadline) {
        fired.push(entry.callback_id);
    }
    queue.advance_to(deadline);
    fired
}

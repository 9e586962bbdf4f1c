//! Storage for the guest-registered `serve` handlers (`serve.fetch`,
//! `serve.websocket.{open,message,close}`) that isolate-daemon's
//! dispatcher calls into (spec.md §4.6). Registered the same way guest
//! timer callbacks are (`crate::ops::op_register_serve_*`): the guest
//! bootstrap forwards e.g. `serve.fetch = f` to a host op that stores the
//! function's `v8::Global` handle for later invocation.

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::{v8, JsRuntime};

use crate::error::EngineError;
use crate::invoke::call_guest_function;

pub type GuestHandlerSlot = Rc<RefCell<Option<v8::Global<v8::Function>>>>;

#[derive(Clone, Default)]
pub struct ServeHandlers {
    pub fetch: GuestHandlerSlot,
    pub ws_open: GuestHandlerSlot,
    pub ws_message: GuestHandlerSlot,
    pub ws_close: GuestHandlerSlot,
}

impl ServeHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Calls a registered handler with JSON-shaped arguments, awaiting its
/// Promise if it returns one (spec.md §9 "Guests naturally speak Promises").
pub async fn dispatch(
    runtime: &mut JsRuntime,
    slot: &GuestHandlerSlot,
    arguments: &[serde_json::Value],
) -> Result<serde_json::Value, EngineError> {
    let function = slot
        .borrow()
        .clone()
        .ok_or_else(|| EngineError::EvaluationFailed("no serve handler registered for this route".to_owned()))?;
    call_guest_function(runtime, &function, arguments).await
}

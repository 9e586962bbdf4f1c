//! isolate-engine: the V8-embedding collaborator (spec.md §4.5). Owns
//! `deno_core::JsRuntime` instances, the module loader hook, LRU-based
//! eviction, and disposal ordering. `isolate-bridge`'s globals are plain
//! Rust; `crate::ops` binds them to `op2` entry points and `src/bootstrap.js`
//! (injected via `ops::isolate_ops`'s `esm_entry_point`) is what turns those
//! ops into the guest-visible globals spec.md §4.3 and §9 describe.

pub mod engine;
pub mod error;
pub mod invoke;
pub mod lifecycle;
pub mod module_loader;
pub mod ops;
pub mod serve;
pub mod stream_support;
pub mod test_support;
pub mod timers;
pub mod ws_bridge;

pub use engine::Engine;
pub use error::EngineError;
pub use invoke::{call_guest_function, eval_module, eval_script};
pub use lifecycle::IsolateHandle;
pub use module_loader::{GuestModuleLoader, LoadedModule, ModuleLoaderHook};
pub use serve::{GuestHandlerSlot, ServeHandlers};
pub use timers::GuestTimerCallbacks;
pub use ws_bridge::WsOutboundRegistry;

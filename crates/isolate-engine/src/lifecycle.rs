//! Isolate lifecycle (spec.md §4.5): create under a memory limit, inject
//! baseline globals for the requested capability set, and dispose in the
//! prescribed order. `isolate_core::Isolate::begin_disposal` already
//! performs the host-side half (streams/callbacks/timers/module cache);
//! this module drives the remaining V8-specific half (release retained
//! handles, release context, dispose isolate) and owns the actual
//! `deno_core::JsRuntime`.

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::{JsRuntime, RuntimeOptions};
use isolate_bridge::globals::{filesystem::FilesystemApi, headers::HeadersApi, streams::StreamsApi};
use isolate_core::{CapabilitySet, Isolate};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::module_loader::{GuestModuleLoader, ModuleLoaderHook};
use crate::ops::isolate_ops;
use crate::serve::ServeHandlers;
use crate::stream_support::{self, ReadableControllers, ReadableReaders, SharedStreamIdAllocator, TransformWriters};
use crate::test_support::TestCallbacks;
use crate::timers::GuestTimerCallbacks;
use crate::ws_bridge::{self, WsOutboundRegistry};

/// A live isolate: the host-side record plus the V8 runtime backing it.
/// `runtime` is `None` once disposed; every further operation against a
/// disposed handle fails instead of touching freed V8 state. `record` is
/// shared with the op layer (`crate::ops`) via `OpState` so a host op can
/// read/mutate the same callback table, module cache, and timer queue the
/// engine-side code (`crate::engine`, `crate::timers`) also touches.
pub struct IsolateHandle {
    pub record: Rc<RefCell<Isolate>>,
    pub timer_callbacks: Rc<RefCell<GuestTimerCallbacks>>,
    pub serve_handlers: ServeHandlers,
    pub test_callbacks: TestCallbacks,
    /// Every connection this isolate's `serve({websocket})` handlers may
    /// push an outbound `send`/`close` into, including connections owned by
    /// *other* isolates (spec.md §4.6, the two-user chat scenario). Shared
    /// with `isolate-daemon::dispatcher`, which registers/unregisters an
    /// entry for the lifetime of each proxied connection.
    pub ws_outbound: WsOutboundRegistry,
    /// Backs the filesystem capability's scratch root, if granted. Kept
    /// alive for the isolate's whole lifetime and removed from disk when
    /// this handle is finally dropped (spec.md §4.5 "Dispose").
    _scratch_dir: Option<tempfile::TempDir>,
    runtime: Option<JsRuntime>,
}

impl IsolateHandle {
    /// Allocates a V8 isolate under `memory_limit_bytes`, creates a context,
    /// wires the module loader hook, and registers the host entry points for
    /// the requested capability set (spec.md §4.5 "Create", §4.3). Baseline
    /// primitive globals (`setTimeout`, `crypto`, `atob`/`btoa`, ...) are the
    /// JS-side bootstrap that calls these ops; `isolate-daemon` supplies and
    /// evaluates that bootstrap script once per created isolate.
    #[instrument(skip(loader_hook))]
    pub fn create(
        id: String,
        memory_limit_bytes: u64,
        capabilities: CapabilitySet,
        loader_hook: Rc<dyn ModuleLoaderHook>,
    ) -> Result<Self, EngineError> {
        let record = Rc::new(RefCell::new(Isolate::new(id.clone(), memory_limit_bytes, capabilities)));
        let timer_callbacks: Rc<RefCell<GuestTimerCallbacks>> = Rc::new(RefCell::new(GuestTimerCallbacks::new()));
        let serve_handlers = ServeHandlers::new();
        let test_callbacks: TestCallbacks = Rc::new(RefCell::new(Default::default()));
        let ws_outbound = ws_bridge::new_registry();
        let headers_api: Rc<RefCell<HeadersApi>> = Rc::new(RefCell::new(HeadersApi::new()));
        let streams_api: Rc<RefCell<StreamsApi>> = Rc::new(RefCell::new(StreamsApi::new()));
        let readable_controllers: ReadableControllers = stream_support::new_controllers();
        let readable_readers: ReadableReaders = stream_support::new_readers();
        let transform_writers: TransformWriters = stream_support::new_transform_writers();
        let stream_id_allocator: SharedStreamIdAllocator = stream_support::new_id_allocator();
        let module_loader = Rc::new(GuestModuleLoader::new(loader_hook, Rc::clone(&record)));

        let (scratch_dir, filesystem_api) = if capabilities.contains(CapabilitySet::FILESYSTEM) {
            let dir = tempfile::tempdir().map_err(|err| EngineError::CreationFailed {
                limit_bytes: memory_limit_bytes,
                message: format!("failed to create filesystem scratch directory: {err}"),
            })?;
            let api = Rc::new(FilesystemApi::new(dir.path().to_path_buf()));
            (Some(dir), Some(api))
        } else {
            (None, None)
        };

        let create_params = deno_core::v8::CreateParams::default()
            .heap_limits(0, usize::try_from(memory_limit_bytes).unwrap_or(usize::MAX));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            module_loader: Some(module_loader),
            create_params: Some(create_params),
            extensions: vec![isolate_ops::init_ops()],
            ..Default::default()
        });

        {
            let op_state = runtime.op_state();
            let mut op_state = op_state.borrow_mut();
            op_state.put(Rc::clone(&record));
            op_state.put(Rc::clone(&timer_callbacks));
            op_state.put(serve_handlers.clone());
            op_state.put(Rc::clone(&test_callbacks));
            op_state.put(Rc::clone(&ws_outbound));
            op_state.put(Rc::clone(&headers_api));
            op_state.put(Rc::clone(&streams_api));
            op_state.put(Rc::clone(&readable_controllers));
            op_state.put(Rc::clone(&readable_readers));
            op_state.put(Rc::clone(&transform_writers));
            op_state.put(Rc::clone(&stream_id_allocator));
            if let Some(api) = &filesystem_api {
                op_state.put(Rc::clone(api));
            }
        }

        info!(isolate_id = %id, memory_limit_bytes, "isolate created");
        Ok(Self {
            record,
            timer_callbacks,
            serve_handlers,
            test_callbacks,
            ws_outbound,
            _scratch_dir: scratch_dir,
            runtime: Some(runtime),
        })
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.runtime.is_none()
    }

    pub fn runtime_mut(&mut self) -> Result<&mut JsRuntime, EngineError> {
        self.runtime
            .as_mut()
            .ok_or_else(|| EngineError::AlreadyDisposed(self.record.borrow().id.clone()))
    }

    /// Disposal ordering (spec.md §4.5): cancel all active streams owned by
    /// the isolate -> reject all pending host callbacks -> clear timer
    /// queue -> dispose module cache -> release all retained guest handles
    /// -> release context -> dispose isolate. Idempotent: a second call is
    /// a no-op and returns an empty cancellation list.
    #[instrument(skip(self), fields(isolate_id = %self.record.borrow().id))]
    pub fn dispose(&mut self) -> Vec<u64> {
        let cancelled_stream_ids = self.record.borrow_mut().begin_disposal();
        self.timer_callbacks.borrow_mut().clear();
        *self.serve_handlers.fetch.borrow_mut() = None;
        *self.serve_handlers.ws_open.borrow_mut() = None;
        *self.serve_handlers.ws_message.borrow_mut() = None;
        *self.serve_handlers.ws_close.borrow_mut() = None;
        self.test_callbacks.borrow_mut().clear();
        self.ws_outbound.borrow_mut().clear();
        // Dropping the runtime releases every retained V8 handle, the
        // context, and finally the isolate itself.
        self.runtime = None;
        info!(cancelled_streams = cancelled_stream_ids.len(), "isolate disposed");
        cancelled_stream_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct NoopLoader;
    impl ModuleLoaderHook for NoopLoader {
        fn load(
            &self,
            specifier: &str,
            _importer_resolve_dir: &str,
        ) -> Pin<Box<dyn Future<Output = Result<crate::module_loader::LoadedModule, EngineError>>>> {
            let specifier = specifier.to_owned();
            Box::pin(async move {
                Err(EngineError::ModuleLoadFailed {
                    specifier,
                    message: "no modules registered in this test".to_owned(),
                })
            })
        }
    }

    #[test]
    fn dispose_is_idempotent_and_reports_cancelled_streams_once() {
        let mut handle = IsolateHandle::create(
            "isolate-1".to_owned(),
            64 * 1024 * 1024,
            CapabilitySet::TIMERS,
            Rc::new(NoopLoader),
        )
        .unwrap();

        assert!(!handle.is_disposed());
        let cancelled_first = handle.dispose();
        assert!(cancelled_first.is_empty());
        assert!(handle.is_disposed());

        let cancelled_second = handle.dispose();
        assert!(cancelled_second.is_empty());
    }

    #[test]
    fn disposed_isolate_rejects_further_runtime_access() {
        let mut handle = IsolateHandle::create(
            "isolate-2".to_owned(),
            64 * 1024 * 1024,
            CapabilitySet::empty(),
            Rc::new(NoopLoader),
        )
        .unwrap();
        handle.dispose();
        assert!(handle.runtime_mut().is_err());
    }
}

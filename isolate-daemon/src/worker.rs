//! The isolate-owning thread (spec.md §5 "each isolate is pinned to at most
//! one thread at a time"). `deno_core::JsRuntime` holds `Rc`s internally and
//! is not `Send`, so every live isolate in this daemon lives on a single
//! dedicated OS thread running a `tokio::task::LocalSet`; the async
//! multiplexer tasks reach it only through an mpsc command channel --
//! the "lock-free cross-thread enqueue" spec.md §5 calls for.

use std::rc::Rc;

use isolate_bridge::globals::websocket::WsOutboundCommand;
use isolate_core::{CapabilityKind, CapabilitySet};
use isolate_engine::{Engine, EngineError};
use isolate_protocol::{CallbackId, StreamId, WsConnectionId};
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::callback_bridge::CallbackBridge;
use crate::error::DaemonError;
use crate::module_hook::ConnectionModuleLoader;

pub enum WorkerCommand {
    /// `bridge`/`module_loader_callback_id` are enough to build the
    /// `ConnectionModuleLoader` on this thread -- `Rc<dyn ModuleLoaderHook>`
    /// itself cannot cross the channel since it is `!Send`.
    CreateIsolate {
        isolate_id: String,
        connection_id: String,
        memory_limit_bytes: u64,
        capabilities: CapabilitySet,
        bridge: CallbackBridge,
        module_loader_callback_id: Option<CallbackId>,
        reply: oneshot::Sender<Result<(), DaemonError>>,
    },
    EvalCode {
        isolate_id: String,
        code: String,
        as_module: bool,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    DispatchFetch {
        isolate_id: String,
        request: serde_json::Value,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    DispatchWsOpen {
        isolate_id: String,
        args: Vec<serde_json::Value>,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    DispatchWsMessage {
        isolate_id: String,
        args: Vec<serde_json::Value>,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    DispatchWsClose {
        isolate_id: String,
        args: Vec<serde_json::Value>,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    RunTests {
        isolate_id: String,
        reply: oneshot::Sender<Result<serde_json::Value, DaemonError>>,
    },
    /// Registers the outbound half of a freshly upgraded WebSocket so that
    /// `ws.send`/`ws.close` from *any* isolate's guest handler can reach it
    /// (spec.md §4.6, the two-user chat scenario). Unregistered on close.
    RegisterWsConnection {
        isolate_id: String,
        connection_id: WsConnectionId,
        sender: mpsc::UnboundedSender<WsOutboundCommand>,
        reply: oneshot::Sender<Result<(), DaemonError>>,
    },
    UnregisterWsConnection {
        isolate_id: String,
        connection_id: WsConnectionId,
    },
    Tick {
        isolate_id: String,
        delta_ms: u64,
        reply: oneshot::Sender<Result<(), DaemonError>>,
    },
    CloseIsolate {
        isolate_id: String,
        reply: oneshot::Sender<Vec<StreamId>>,
    },
    /// Host-assigns a callback id for a client-supplied callback (module
    /// loader, fetch collaborator, ...). `CallbackTable::register` always
    /// assigns a fresh id, so the caller learns it from `reply` and must
    /// relay it back to the client (spec.md §4.3 "Runtime options ...
    /// supply callbacks").
    RegisterCallback {
        isolate_id: String,
        capability: CapabilityKind,
        metadata: Option<String>,
        reply: oneshot::Sender<Result<CallbackId, DaemonError>>,
    },
}

#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    pub async fn send(&self, command: WorkerCommand) -> Result<(), DaemonError> {
        self.tx.send(command).map_err(|_| DaemonError::WorkerGone)
    }
}

/// Spawns the dedicated isolate thread and returns a handle for enqueuing
/// commands onto it. `max_isolates` is the daemon-wide cap shared by every
/// connection (spec.md §4.5 Eviction).
pub fn spawn(max_isolates: usize) -> WorkerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerCommand>();

    std::thread::Builder::new()
        .name("isolate-worker".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!(error = %err, "failed to start isolate worker runtime");
                    return;
                }
            };
            let local = tokio::task::LocalSet::new();
            local.block_on(&runtime, async move {
                let mut engine = Engine::new(max_isolates);
                while let Some(command) = rx.recv().await {
                    handle_command(&mut engine, command).await;
                }
            });
        })
        .expect("failed to spawn isolate worker thread");

    WorkerHandle { tx }
}

async fn handle_command(engine: &mut Engine, command: WorkerCommand) {
    match command {
        WorkerCommand::CreateIsolate {
            isolate_id,
            connection_id,
            memory_limit_bytes,
            capabilities,
            bridge,
            module_loader_callback_id,
            reply,
        } => {
            let loader_hook: Rc<dyn isolate_engine::ModuleLoaderHook> =
                Rc::new(ConnectionModuleLoader::new(bridge, module_loader_callback_id));
            let result = engine
                .create_isolate(isolate_id, connection_id, memory_limit_bytes, capabilities, loader_hook)
                .map_err(DaemonError::from);
            let _ = reply.send(result);
        }
        WorkerCommand::EvalCode {
            isolate_id,
            code,
            as_module,
            reply,
        } => {
            let result = eval(engine, &isolate_id, &code, as_module).await;
            let _ = reply.send(result);
        }
        WorkerCommand::DispatchFetch { isolate_id, request, reply } => {
            let result = dispatch_serve(engine, &isolate_id, |handlers| &handlers.fetch, vec![request]).await;
            let _ = reply.send(result);
        }
        WorkerCommand::DispatchWsOpen { isolate_id, args, reply } => {
            let result = dispatch_serve(engine, &isolate_id, |handlers| &handlers.ws_open, args).await;
            let _ = reply.send(result);
        }
        WorkerCommand::DispatchWsMessage { isolate_id, args, reply } => {
            let result = dispatch_serve(engine, &isolate_id, |handlers| &handlers.ws_message, args).await;
            let _ = reply.send(result);
        }
        WorkerCommand::DispatchWsClose { isolate_id, args, reply } => {
            let result = dispatch_serve(engine, &isolate_id, |handlers| &handlers.ws_close, args).await;
            let _ = reply.send(result);
        }
        WorkerCommand::RunTests { isolate_id, reply } => {
            let result = run_tests(engine, &isolate_id).await;
            let _ = reply.send(result);
        }
        WorkerCommand::RegisterWsConnection {
            isolate_id,
            connection_id,
            sender,
            reply,
        } => {
            let result = engine
                .get_mut(&isolate_id)
                .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.clone())))
                .map(|handle| {
                    handle.ws_outbound.borrow_mut().insert(connection_id, sender);
                });
            let _ = reply.send(result);
        }
        WorkerCommand::UnregisterWsConnection { isolate_id, connection_id } => {
            if let Some(handle) = engine.get_mut(&isolate_id) {
                handle.ws_outbound.borrow_mut().remove(&connection_id);
            }
        }
        WorkerCommand::Tick {
            isolate_id,
            delta_ms,
            reply,
        } => {
            let result = tick(engine, &isolate_id, delta_ms).await;
            let _ = reply.send(result);
        }
        WorkerCommand::CloseIsolate { isolate_id, reply } => {
            let cancelled = engine.dispose(&isolate_id);
            engine.remove(&isolate_id);
            let _ = reply.send(cancelled);
        }
        WorkerCommand::RegisterCallback {
            isolate_id,
            capability,
            metadata,
            reply,
        } => {
            let result = engine
                .get_mut(&isolate_id)
                .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.clone())))
                .map(|handle| handle.record.borrow_mut().callbacks.register(capability, metadata));
            let _ = reply.send(result);
        }
    }
}

async fn eval(
    engine: &mut Engine,
    isolate_id: &str,
    code: &str,
    as_module: bool,
) -> Result<serde_json::Value, DaemonError> {
    let handle = engine
        .get_mut(isolate_id)
        .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.to_owned())))?;
    let runtime = handle.runtime_mut()?;
    if as_module {
        isolate_engine::eval_module(runtime, isolate_id, code).await?;
        Ok(serde_json::Value::Null)
    } else {
        Ok(isolate_engine::eval_script(runtime, isolate_id, code).await?)
    }
}

async fn dispatch_serve(
    engine: &mut Engine,
    isolate_id: &str,
    slot: impl FnOnce(&isolate_engine::ServeHandlers) -> &isolate_engine::GuestHandlerSlot,
    arguments: Vec<serde_json::Value>,
) -> Result<serde_json::Value, DaemonError> {
    let handle = engine
        .get_mut(isolate_id)
        .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.to_owned())))?;
    let slot = slot(&handle.serve_handlers).clone();
    let runtime = handle.runtime_mut()?;
    Ok(isolate_engine::serve::dispatch(runtime, &slot, &arguments).await?)
}

async fn run_tests(engine: &mut Engine, isolate_id: &str) -> Result<serde_json::Value, DaemonError> {
    let handle = engine
        .get_mut(isolate_id)
        .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.to_owned())))?;
    let callbacks = handle.test_callbacks.clone();
    let record = handle.record.clone();
    let runtime = handle.runtime_mut()?;
    let mut record = record.borrow_mut();
    let registry = record
        .test_registry
        .as_mut()
        .ok_or_else(|| DaemonError::Protocol("test runner capability not enabled for this isolate".to_owned()))?;
    isolate_engine::test_support::run(runtime, registry, &callbacks).await;
    Ok(isolate_engine::test_support::results_to_json(registry))
}

async fn tick(engine: &mut Engine, isolate_id: &str, delta_ms: u64) -> Result<(), DaemonError> {
    let handle = engine
        .get_mut(isolate_id)
        .ok_or_else(|| DaemonError::Core(isolate_core::CoreError::IsolateNotFound(isolate_id.to_owned())))?;
    let callbacks = handle.timer_callbacks.clone();
    let record = handle.record.clone();
    let runtime = handle.runtime_mut()?;
    let errors: Vec<EngineError> = {
        let mut record = record.borrow_mut();
        let callbacks = callbacks.borrow();
        isolate_engine::timers::tick(runtime, &mut record, &callbacks, delta_ms).await
    };
    for err in errors {
        error!(isolate_id, error = %err, "error in timer callback (timer queue continues)");
    }
    Ok(())
}

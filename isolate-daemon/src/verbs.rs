//! The verb table (spec.md §4.6, §4.8, §6 "Runtime options"): translates a
//! `Request` frame's `(target, verb, arguments)` into a call against the
//! isolate worker thread and the connection's own bookkeeping.

use std::collections::BTreeMap;
use std::sync::Arc;

use isolate_core::{CapabilityKind, CapabilitySet, Connection};
use isolate_protocol::{CallbackId, MarshalledValue, RequestTarget};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::callback_bridge::CallbackBridge;
use crate::error::DaemonError;
use crate::json_bridge::{from_json, to_json};
use crate::state::DaemonState;
use crate::worker::WorkerCommand;

pub async fn dispatch(
    connection: &Arc<Connection>,
    state: &DaemonState,
    bridge: &CallbackBridge,
    target: &RequestTarget,
    verb: &str,
    arguments: Vec<MarshalledValue>,
) -> Result<MarshalledValue, DaemonError> {
    match (target, verb) {
        (RequestTarget::Connection, "createRuntime") => create_runtime(connection, state, bridge, arguments).await,
        (RequestTarget::Connection, "connection.close") => close_connection(connection, state).await,
        (RequestTarget::Isolate(isolate_id), "runtime.eval") => eval(state, isolate_id, arguments).await,
        (RequestTarget::Isolate(isolate_id), "runtime.fetch.dispatchRequest") => {
            dispatch_fetch(state, isolate_id, arguments).await
        }
        (RequestTarget::Isolate(isolate_id), "runtime.fetch.onFetch") => register_fetch_collaborator(state, isolate_id).await,
        (RequestTarget::Isolate(isolate_id), "runtime.testEnvironment.runTests") => run_tests(state, isolate_id).await,
        (RequestTarget::Isolate(isolate_id), "runtime.close") => close_runtime(connection, state, isolate_id).await,
        (other_target, other_verb) => Err(DaemonError::UnknownVerb(other_verb.to_owned(), format!("{other_target:?}"))),
    }
}

fn expect_record(arguments: Vec<MarshalledValue>) -> BTreeMap<String, MarshalledValue> {
    match arguments.into_iter().next() {
        Some(MarshalledValue::Record(fields)) => fields,
        _ => BTreeMap::new(),
    }
}

fn parse_capabilities(value: Option<&MarshalledValue>) -> CapabilitySet {
    let mut set = CapabilitySet::empty();
    if let Some(MarshalledValue::Sequence(items)) = value {
        for item in items {
            if let MarshalledValue::String(name) = item {
                set |= match name.as_str() {
                    "fetch" => CapabilitySet::FETCH,
                    "websocket" => CapabilitySet::WEBSOCKET,
                    "crypto" => CapabilitySet::CRYPTO,
                    "timers" => CapabilitySet::TIMERS,
                    "filesystem" => CapabilitySet::FILESYSTEM,
                    "testRunner" => CapabilitySet::TEST_RUNNER,
                    "serve" => CapabilitySet::SERVE,
                    _ => CapabilitySet::empty(),
                };
            }
        }
    }
    set
}

/// `createRuntime(options)` (spec.md §6): allocates an isolate under the
/// requested capability set and memory limit, and -- if the client asked
/// for a module loader -- registers the callback and returns its
/// host-assigned id so the client knows which id a future `CallbackInvoke`
/// refers to.
///
/// The id it registers is always `1`: `CallbackTable::register` assigns
/// ids sequentially starting from a fresh isolate's empty table, and this
/// is the first callback registered against it, so the id is known before
/// the round trip completes rather than guessed.
async fn create_runtime(
    connection: &Arc<Connection>,
    state: &DaemonState,
    bridge: &CallbackBridge,
    arguments: Vec<MarshalledValue>,
) -> Result<MarshalledValue, DaemonError> {
    let fields = expect_record(arguments);
    let capabilities = parse_capabilities(fields.get("capabilities"));
    let memory_limit_bytes = match fields.get("memoryLimitBytes") {
        Some(MarshalledValue::Number(n)) => *n as u64,
        _ => state.default_memory_limit_bytes,
    };
    let wants_module_loader = matches!(fields.get("moduleLoader"), Some(MarshalledValue::Bool(true)));
    let provisional_module_loader_id: Option<CallbackId> = wants_module_loader.then_some(1);

    let isolate_id = Uuid::new_v4().to_string();
    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::CreateIsolate {
            isolate_id: isolate_id.clone(),
            connection_id: connection.connection_id.clone(),
            memory_limit_bytes,
            capabilities,
            bridge: bridge.clone(),
            module_loader_callback_id: provisional_module_loader_id,
            reply: tx,
        })
        .await?;
    rx.await.map_err(|_| DaemonError::WorkerGone)??;

    connection
        .adopt_isolate(isolate_core::Isolate::new(isolate_id.clone(), memory_limit_bytes, capabilities))
        .await;

    let mut result = BTreeMap::new();
    result.insert("isolateId".to_owned(), MarshalledValue::String(isolate_id.clone()));

    if wants_module_loader {
        let callback_id = register_callback(state, &isolate_id, CapabilityKind::ModuleLoader, None).await?;
        result.insert(
            "moduleLoaderCallbackId".to_owned(),
            MarshalledValue::Number(callback_id as f64),
        );
    }

    Ok(MarshalledValue::record(result))
}

async fn register_callback(
    state: &DaemonState,
    isolate_id: &str,
    capability: CapabilityKind,
    metadata: Option<String>,
) -> Result<CallbackId, DaemonError> {
    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::RegisterCallback {
            isolate_id: isolate_id.to_owned(),
            capability,
            metadata,
            reply: tx,
        })
        .await?;
    rx.await.map_err(|_| DaemonError::WorkerGone)?
}

/// `runtime.eval(code, asModule?)` (spec.md §4.6).
async fn eval(state: &DaemonState, isolate_id: &str, arguments: Vec<MarshalledValue>) -> Result<MarshalledValue, DaemonError> {
    let code = arguments
        .first()
        .and_then(MarshalledValue::as_str)
        .ok_or_else(|| DaemonError::Protocol("runtime.eval expects a code string argument".to_owned()))?
        .to_owned();
    let as_module = matches!(arguments.get(1), Some(MarshalledValue::Bool(true)));

    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::EvalCode {
            isolate_id: isolate_id.to_owned(),
            code,
            as_module,
            reply: tx,
        })
        .await?;
    let value = rx.await.map_err(|_| DaemonError::WorkerGone)??;
    Ok(from_json(&value))
}

/// `runtime.fetch.dispatchRequest(request)` (spec.md §4.6 "HTTP dispatch"):
/// hands a marshalled `Request`-shaped record to the guest's registered
/// `serve.fetch` handler and returns its `Response`-shaped result.
async fn dispatch_fetch(
    state: &DaemonState,
    isolate_id: &str,
    arguments: Vec<MarshalledValue>,
) -> Result<MarshalledValue, DaemonError> {
    let request = arguments.first().map(to_json).unwrap_or(serde_json::Value::Null);
    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::DispatchFetch {
            isolate_id: isolate_id.to_owned(),
            request,
            reply: tx,
        })
        .await?;
    let value = rx.await.map_err(|_| DaemonError::WorkerGone)??;
    Ok(from_json(&value))
}

/// `runtime.fetch.onFetch(callback)` (spec.md §6): registers the host-side
/// fetch collaborator a guest's outbound `fetch()` calls are bridged
/// through -- this daemon has no outbound HTTP client of its own, so an
/// isolate with the `fetch` capability but no registered collaborator
/// simply has nothing to dispatch to.
async fn register_fetch_collaborator(state: &DaemonState, isolate_id: &str) -> Result<MarshalledValue, DaemonError> {
    let callback_id = register_callback(state, isolate_id, CapabilityKind::Fetch, None).await?;
    let mut result = BTreeMap::new();
    result.insert("callbackId".to_owned(), MarshalledValue::Number(callback_id as f64));
    Ok(MarshalledValue::record(result))
}

/// `runtime.testEnvironment.runTests()` (spec.md §4.8).
async fn run_tests(state: &DaemonState, isolate_id: &str) -> Result<MarshalledValue, DaemonError> {
    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::RunTests {
            isolate_id: isolate_id.to_owned(),
            reply: tx,
        })
        .await?;
    let value = rx.await.map_err(|_| DaemonError::WorkerGone)??;
    Ok(from_json(&value))
}

/// `runtime.close()` (spec.md §4.5 "Dispose"): disposes the isolate on the
/// worker thread and retires this connection's own bookkeeping copy,
/// cancelling whichever streams it owned.
async fn close_runtime(
    connection: &Arc<Connection>,
    state: &DaemonState,
    isolate_id: &str,
) -> Result<MarshalledValue, DaemonError> {
    let (tx, rx) = oneshot::channel();
    state
        .worker
        .send(WorkerCommand::CloseIsolate {
            isolate_id: isolate_id.to_owned(),
            reply: tx,
        })
        .await?;
    rx.await.map_err(|_| DaemonError::WorkerGone)?;

    if let Some(mut isolate) = connection.remove_isolate(isolate_id).await {
        for stream_id in isolate.begin_disposal() {
            connection.remove_stream_session(stream_id).await;
        }
    }
    Ok(MarshalledValue::Null)
}

/// `connection.close()` (spec.md §3 "closing a connection tears down all
/// its isolates"): an explicit, graceful variant of what disconnect
/// teardown does implicitly.
async fn close_connection(connection: &Arc<Connection>, state: &DaemonState) -> Result<MarshalledValue, DaemonError> {
    for isolate_id in connection.isolate_ids().await {
        let (tx, rx) = oneshot::channel();
        if state
            .worker
            .send(WorkerCommand::CloseIsolate {
                isolate_id: isolate_id.clone(),
                reply: tx,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
    connection.teardown_all_isolates().await;
    Ok(MarshalledValue::Null)
}

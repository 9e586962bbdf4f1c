//! Calling *into* the guest: evaluating top-level code (`runtime.eval`) and
//! invoking a previously stored guest function with JSON-shaped arguments
//! (timer callbacks, `serve.fetch`/`serve.websocket` handlers -- spec.md
//! §4.6, §4.8). `deno_core::JsRuntime::call_with_args` plus driving the
//! event loop is the standard way to await a guest Promise from host code.

use deno_core::{serde_v8, v8, JsRuntime, PollEventLoopOptions};

use crate::error::EngineError;

/// Executes `code` as a classic script (not a module) and returns its
/// completion value as JSON. Module evaluation goes through
/// `JsRuntime::load_main_es_module`/`mod_evaluate` instead, driven by the
/// module loader hook (`crate::module_loader`).
pub async fn eval_script(
    runtime: &mut JsRuntime,
    specifier: &str,
    code: &str,
) -> Result<serde_json::Value, EngineError> {
    let global = runtime
        .execute_script(specifier.to_owned(), code.to_owned())
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))?;

    resolve_and_read(runtime, global).await
}

/// Loads and evaluates `code` as an ES module, returning the module's
/// namespace is not meaningful for a side-effecting `serve(...)` script, so
/// this simply drives evaluation to completion and reports failure.
pub async fn eval_module(runtime: &mut JsRuntime, specifier: &str, code: &str) -> Result<(), EngineError> {
    let specifier = deno_core::resolve_path(specifier, &std::env::current_dir().unwrap_or_default())
        .map_err(|e| EngineError::ResolutionFailed(specifier.to_owned(), e.to_string()))?;
    let module_id = runtime
        .load_main_es_module_from_code(&specifier, code.to_owned())
        .await
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))?;
    let evaluation = runtime.mod_evaluate(module_id);
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))?;
    evaluation
        .await
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))
}

/// Calls a stored guest function with JSON-shaped arguments (timer fires,
/// dispatched `fetch`/`websocket` handlers) and awaits its result, which may
/// itself be a Promise.
pub async fn call_guest_function(
    runtime: &mut JsRuntime,
    function: &v8::Global<v8::Function>,
    arguments: &[serde_json::Value],
) -> Result<serde_json::Value, EngineError> {
    let args = {
        let scope = &mut runtime.handle_scope();
        arguments
            .iter()
            .map(|arg| {
                serde_v8::to_v8(scope, arg)
                    .map(|local| v8::Global::new(scope, local))
                    .map_err(|e| EngineError::EvaluationFailed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let call = runtime.call_with_args(function, &args);
    let result = runtime
        .with_event_loop_promise(call, PollEventLoopOptions::default())
        .await
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))?;

    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, result);
    serde_v8::from_v8(scope, local).map_err(|e| EngineError::EvaluationFailed(e.to_string()))
}

async fn resolve_and_read(
    runtime: &mut JsRuntime,
    global: v8::Global<v8::Value>,
) -> Result<serde_json::Value, EngineError> {
    let resolved = runtime
        .with_event_loop_promise(
            deno_core::futures::future::ready(Ok(global)),
            PollEventLoopOptions::default(),
        )
        .await
        .map_err(|e| EngineError::EvaluationFailed(e.to_string()))?;

    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, resolved);
    serde_v8::from_v8(scope, local).map_err(|e| EngineError::EvaluationFailed(e.to_string()))
}

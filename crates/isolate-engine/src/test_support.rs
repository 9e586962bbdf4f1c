//! Host-driven execution of a guest's collected `describe`/`it` tree
//! (spec.md §3 "Test registry", §6 `runtime.testEnvironment.runTests()`).
//! Collection (`describe`/`it`/`before*`/`after*`) happens synchronously in
//! the guest via `crate::ops`'s `op_test_*` entry points, which only
//! populate `isolate_core::TestRegistry`; actually *running* the collected
//! suite -- invoking each stored callback in turn and catching its
//! rejection -- is host-side orchestration, the same shape
//! `crate::timers::tick` uses to fire a stored callback and keep going on
//! error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use deno_core::{v8, JsRuntime};
use isolate_core::{Suite, TestModifier, TestOutcome, TestRegistry, TestResult};

use crate::invoke::call_guest_function;

#[derive(Default)]
pub struct TestCallbackTable {
    callbacks: HashMap<u64, v8::Global<v8::Function>>,
    next_id: u64,
}

pub type TestCallbacks = Rc<RefCell<TestCallbackTable>>;

impl TestCallbackTable {
    pub fn insert(&mut self, callback: v8::Global<v8::Function>) -> u64 {
        self.next_id += 1;
        self.callbacks.insert(self.next_id, callback);
        self.next_id
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<v8::Global<v8::Function>> {
        self.callbacks.get(&id).cloned()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
        self.next_id = 0;
    }
}

/// Runs every collected suite depth-first. `it.only` anywhere in the tree
/// skips every test not itself marked `.only`, matching common `describe`/
/// `it` runners; a hook or test throwing does not stop the run.
pub async fn run(runtime: &mut JsRuntime, registry: &mut TestRegistry, callbacks: &TestCallbacks) {
    registry.reset_results();
    let root = registry.root().clone();
    let has_only = suite_has_only(&root);
    run_suite(runtime, &root, &[], callbacks, registry, has_only).await;
}

fn suite_has_only(suite: &Suite) -> bool {
    suite.tests.iter().any(|t| t.modifier == TestModifier::Only) || suite.children.iter().any(suite_has_only)
}

fn run_suite<'a>(
    runtime: &'a mut JsRuntime,
    suite: &'a Suite,
    path: &'a [String],
    callbacks: &'a TestCallbacks,
    registry: &'a mut TestRegistry,
    has_only: bool,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
    Box::pin(async move {
        let mut path = path.to_vec();
        path.push(suite.name.clone());

        for id in &suite.before_all {
            let _ = call(runtime, callbacks, *id).await;
        }

        for test in &suite.tests {
            let (outcome, failure_message) = if test.modifier == TestModifier::Skip {
                (TestOutcome::Skipped, None)
            } else if test.modifier == TestModifier::Todo {
                (TestOutcome::Todo, None)
            } else if has_only && test.modifier != TestModifier::Only {
                (TestOutcome::Skipped, None)
            } else {
                for id in &suite.before_each {
                    let _ = call(runtime, callbacks, *id).await;
                }
                let result = call(runtime, callbacks, test.callback_id).await;
                for id in &suite.after_each {
                    let _ = call(runtime, callbacks, *id).await;
                }
                match result {
                    Ok(()) => (TestOutcome::Passed, None),
                    Err(message) => (TestOutcome::Failed, Some(message)),
                }
            };
            registry.record_result(TestResult {
                suite_path: path.clone(),
                name: test.name.clone(),
                outcome,
                failure_message,
            });
        }

        for child in &suite.children {
            run_suite(runtime, child, &path, callbacks, registry, has_only).await;
        }

        for id in &suite.after_all {
            let _ = call(runtime, callbacks, *id).await;
        }
    })
}

async fn call(runtime: &mut JsRuntime, callbacks: &TestCallbacks, id: u64) -> Result<(), String> {
    let Some(function) = callbacks.borrow().get(id) else {
        return Err(format!("no callback registered for test id {id}"));
    };
    call_guest_function(runtime, &function, &[]).await.map(|_| ()).map_err(|e| e.to_string())
}

/// Converts the accumulated results into the JSON shape
/// `runtime.testEnvironment.runTests()` resolves with.
#[must_use]
pub fn results_to_json(registry: &TestRegistry) -> serde_json::Value {
    serde_json::Value::Array(
        registry
            .results()
            .iter()
            .map(|result| {
                let outcome = match result.outcome {
                    TestOutcome::Passed => "passed",
                    TestOutcome::Failed => "failed",
                    TestOutcome::Skipped => "skipped",
                    TestOutcome::Todo => "todo",
                };
                serde_json::json!({
                    "suitePath": result.suite_path,
                    "name": result.name,
                    "outcome": outcome,
                    "failureMessage": result.failure_message,
                })
            })
            .collect(),
    )
}

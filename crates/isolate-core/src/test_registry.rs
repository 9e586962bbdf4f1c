//! In-isolate test registry (spec.md §3 "Test registry"), active only when
//! the test capability is enabled. Mirrors the `describe`/`it` tree shape a
//! guest builds during collection.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestModifier {
    None,
    Skip,
    Only,
    Todo,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub modifier: TestModifier,
    pub callback_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub name: String,
    pub before_all: Vec<u64>,
    pub after_all: Vec<u64>,
    pub before_each: Vec<u64>,
    pub after_each: Vec<u64>,
    pub tests: Vec<TestCase>,
    pub children: Vec<Suite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    Todo,
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub suite_path: Vec<String>,
    pub name: String,
    pub outcome: TestOutcome,
    pub failure_message: Option<String>,
}

/// Tracks the root suite, a cursor into the suite currently being populated
/// during collection, and the accumulated results of the last run.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    root: Suite,
    /// Index path from `root` to the suite currently being collected into.
    cursor: Vec<usize>,
    results: Vec<TestResult>,
}

impl TestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_suite_mut(&mut self) -> &mut Suite {
        let mut suite = &mut self.root;
        for &index in &self.cursor {
            suite = &mut suite.children[index];
        }
        suite
    }

    pub fn enter_describe(&mut self, name: impl Into<String>) {
        let suite = self.current_suite_mut();
        suite.children.push(Suite {
            name: name.into(),
            ..Suite::default()
        });
        let index = suite.children.len() - 1;
        self.cursor.push(index);
    }

    pub fn exit_describe(&mut self) {
        self.cursor.pop();
    }

    pub fn register_test(&mut self, name: impl Into<String>, modifier: TestModifier, callback_id: u64) {
        self.current_suite_mut().tests.push(TestCase {
            name: name.into(),
            modifier,
            callback_id,
        });
    }

    pub fn register_before_all(&mut self, callback_id: u64) {
        self.current_suite_mut().before_all.push(callback_id);
    }

    pub fn register_after_all(&mut self, callback_id: u64) {
        self.current_suite_mut().after_all.push(callback_id);
    }

    pub fn register_before_each(&mut self, callback_id: u64) {
        self.current_suite_mut().before_each.push(callback_id);
    }

    pub fn register_after_each(&mut self, callback_id: u64) {
        self.current_suite_mut().after_each.push(callback_id);
    }

    #[must_use]
    pub fn root(&self) -> &Suite {
        &self.root
    }

    pub fn record_result(&mut self, result: TestResult) {
        self.results.push(result);
    }

    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Resets the results accumulator between runs (spec.md §3); the
    /// collected suite tree itself is left intact.
    pub fn reset_results(&mut self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_describes_build_a_tree_via_the_cursor() {
        let mut registry = TestRegistry::new();
        registry.enter_describe("outer");
        registry.register_test("outer test", TestModifier::None, 1);
        registry.enter_describe("inner");
        registry.register_test("inner test", TestModifier::Only, 2);
        registry.exit_describe();
        registry.exit_describe();

        let outer = &registry.root().children[0];
        assert_eq!(outer.name, "outer");
        assert_eq!(outer.tests[0].name, "outer test");
        let inner = &outer.children[0];
        assert_eq!(inner.tests[0].modifier, TestModifier::Only);
    }

    #[test]
    fn reset_results_clears_accumulator_but_keeps_tree() {
        let mut registry = TestRegistry::new();
        registry.enter_describe("suite");
        registry.register_test("t", TestModifier::None, 1);
        registry.exit_describe();
        registry.record_result(TestResult {
            suite_path: vec!["suite".to_owned()],
            name: "t".to_owned(),
            outcome: TestOutcome::Passed,
            failure_message: None,
        });

        registry.reset_results();
        assert!(registry.results().is_empty());
        assert_eq!(registry.root().children.len(), 1);
    }
}

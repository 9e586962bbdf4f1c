//! The in-isolate test runner surface (`describe`/`it`/`expect`, spec.md
//! §4.3, §3 "Test registry"). A thin collection-time skin over
//! `isolate_core::TestRegistry`, plus the glossary's minimal `expect`
//! matcher set evaluated host-side once the guest has produced the actual
//! and expected values.

use isolate_core::{TestModifier, TestOutcome, TestRegistry, TestResult};
use isolate_protocol::MarshalledValue;

use crate::error_bridge::{type_error, BridgeError};

/// `describe(name, fn)`: the guest has already invoked `fn` by the time this
/// is called for `exit`, since collection is synchronous.
pub fn describe_enter(registry: &mut TestRegistry, name: impl Into<String>) {
    registry.enter_describe(name);
}

pub fn describe_exit(registry: &mut TestRegistry) {
    registry.exit_describe();
}

/// `it(name, fn)` / `it.skip(...)` / `it.only(...)` / `it.todo(...)`.
pub fn it(registry: &mut TestRegistry, name: impl Into<String>, modifier: TestModifier, callback_id: u64) {
    registry.register_test(name, modifier, callback_id);
}

pub fn before_all(registry: &mut TestRegistry, callback_id: u64) {
    registry.register_before_all(callback_id);
}

pub fn after_all(registry: &mut TestRegistry, callback_id: u64) {
    registry.register_after_all(callback_id);
}

pub fn before_each(registry: &mut TestRegistry, callback_id: u64) {
    registry.register_before_each(callback_id);
}

pub fn after_each(registry: &mut TestRegistry, callback_id: u64) {
    registry.register_after_each(callback_id);
}

pub fn record_result(registry: &mut TestRegistry, result: TestResult) {
    registry.record_result(result);
}

/// The glossary's minimal matcher set for `expect(actual).matcher(expected)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    ToBe,
    ToEqual,
    ToBeTruthy,
    ToBeFalsy,
    ToThrow,
}

/// Evaluates one assertion, returning `Ok(())` on pass or a `BridgeError`
/// carrying the failure message the guest's thrown `AssertionError` should
/// report.
pub fn expect(matcher: Matcher, actual: &MarshalledValue, expected: Option<&MarshalledValue>) -> Result<(), BridgeError> {
    let passed = match matcher {
        Matcher::ToBe | Matcher::ToEqual => {
            let expected = expected.ok_or_else(|| type_error("matcher requires an expected value"))?;
            actual == expected
        }
        Matcher::ToBeTruthy => is_truthy(actual),
        Matcher::ToBeFalsy => !is_truthy(actual),
        Matcher::ToThrow => {
            matches!(actual, MarshalledValue::String(s) if s.starts_with('['))
        }
    };

    if passed {
        Ok(())
    } else {
        Err(type_error(format!(
            "expected {actual:?} to satisfy {matcher:?}{}",
            expected.map(|e| format!(" against {e:?}")).unwrap_or_default()
        )))
    }
}

fn is_truthy(value: &MarshalledValue) -> bool {
    match value {
        MarshalledValue::Null | MarshalledValue::Undefined => false,
        MarshalledValue::Bool(b) => *b,
        MarshalledValue::Number(n) => *n != 0.0 && !n.is_nan(),
        MarshalledValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_equal_compares_structurally() {
        let actual = MarshalledValue::Number(42.0);
        let expected = MarshalledValue::Number(42.0);
        assert!(expect(Matcher::ToEqual, &actual, Some(&expected)).is_ok());
    }

    #[test]
    fn to_equal_fails_with_a_descriptive_message() {
        let actual = MarshalledValue::Number(1.0);
        let expected = MarshalledValue::Number(2.0);
        let err = expect(Matcher::ToEqual, &actual, Some(&expected)).unwrap_err();
        assert!(err.to_wire().message.contains("expected"));
    }

    #[test]
    fn truthy_and_falsy_match_javascript_coercion_for_common_cases() {
        assert!(expect(Matcher::ToBeTruthy, &MarshalledValue::String("x".to_owned()), None).is_ok());
        assert!(expect(Matcher::ToBeFalsy, &MarshalledValue::String(String::new()), None).is_ok());
        assert!(expect(Matcher::ToBeFalsy, &MarshalledValue::Null, None).is_ok());
    }

    #[test]
    fn describe_it_collection_builds_the_expected_tree() {
        let mut registry = TestRegistry::new();
        describe_enter(&mut registry, "math");
        it(&mut registry, "adds", TestModifier::None, 1);
        describe_exit(&mut registry);

        assert_eq!(registry.root().children[0].name, "math");
        assert_eq!(registry.root().children[0].tests[0].name, "adds");
    }
}

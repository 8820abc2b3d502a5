//! Assertion helpers for integrity results and serialized trees

use serde_json::Value as JsonValue;
use studbook_orm::IntegrityWarning;

use crate::{TestError, TestResult};

/// Collection of test assertions
pub struct TestAssertions;

impl TestAssertions {
    /// Assert that JSON contains expected fields/values
    pub fn assert_json_contains(actual: &JsonValue, expected: &JsonValue) -> TestResult<()> {
        if !json_contains(actual, expected) {
            return Err(TestError::Assertion {
                message: format!(
                    "JSON does not contain expected values:\nExpected to contain: {}\nActual: {}",
                    serde_json::to_string_pretty(expected).unwrap_or_default(),
                    serde_json::to_string_pretty(actual).unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    /// Assert the `(table, field)` pairs of warnings, in order
    pub fn assert_warnings(warnings: &[IntegrityWarning], expected: &[(&str, &str)]) -> TestResult<()> {
        let actual: Vec<(&str, &str)> = warnings
            .iter()
            .map(|w| (w.dependent_entity_type.as_str(), w.dependent_field.as_str()))
            .collect();
        if actual != expected {
            return Err(TestError::Assertion {
                message: format!("Expected warnings {:?}, got {:?}", expected, actual),
            });
        }
        Ok(())
    }

    /// Assert that a value is within a certain range
    pub fn assert_in_range<T>(value: T, min: T, max: T) -> TestResult<()>
    where
        T: PartialOrd + std::fmt::Display,
    {
        if value < min || value > max {
            return Err(TestError::Assertion {
                message: format!("Value {} is not in range [{}, {}]", value, min, max),
            });
        }
        Ok(())
    }
}

fn json_contains(actual: &JsonValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (JsonValue::Object(actual_map), JsonValue::Object(expected_map)) => expected_map
            .iter()
            .all(|(key, value)| actual_map.get(key).is_some_and(|a| json_contains(a, value))),
        (JsonValue::Array(actual_arr), JsonValue::Array(expected_arr)) => expected_arr
            .iter()
            .all(|item| actual_arr.iter().any(|a| json_contains(a, item))),
        _ => actual == expected,
    }
}

//! Minimal field types for unit tests

use serde_json::Value;

use super::validator::{LessFunc, Validator};

pub(crate) struct StringType;

impl Validator for StringType {
    fn validate(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err("not a string".to_string()),
        }
    }

    fn less_func(&self) -> Option<LessFunc> {
        Some(|a, b| match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        })
    }
}

/// Integer type, accepting whole floats and normalizing them to integers
pub(crate) struct IntegerType;

impl Validator for IntegerType {
    fn validate(&self, value: &Value) -> Result<Value, String> {
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
            _ => Err("not an integer".to_string()),
        }
    }

    fn is_numeric(&self) -> bool {
        true
    }

    fn less_func(&self) -> Option<LessFunc> {
        Some(|a, b| match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        })
    }
}

pub(crate) struct BoolType;

impl Validator for BoolType {
    fn validate(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err("not a Boolean".to_string()),
        }
    }
}

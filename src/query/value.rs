//! # Value Helpers
//!
//! Documents are JSON objects. Numbers coming from the query DSL are always
//! floats while numbers coming from stored documents may be integers, so all
//! comparisons go through [`values_equal`] instead of `Value`'s `PartialEq`.

use serde_json::{Map, Number, Value};

/// A document is a JSON object
pub type Document = Map<String, Value>;

/// Returns the numeric value of `value` if it is a number
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Build a JSON number from a float, `None` for NaN and infinities
pub fn number_value(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

/// Deep equality with numbers compared by their float value
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Look up a field by dotted path (`field.sub.leaf`).
///
/// Returns `Some` for a present field even when its value is null, `None`
/// when any level of the path is missing or is not a document.
pub fn get_field<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head) {
            Some(Value::Object(sub)) => get_field(sub, rest),
            _ => None,
        },
    }
}

/// Format a float the shortest way that parses back to the same value
pub fn format_number(f: f64) -> String {
    format!("{}", f)
}

/// Quote a string as a JSON string literal
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Render a value in the predicate DSL form
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        },
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), format_value(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

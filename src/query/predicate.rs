//! # Predicate Expressions
//!
//! A predicate is a list of expressions implicitly joined with AND. The
//! operator vocabulary follows MongoDB: equality and list membership also
//! match when the field holds a list containing the value.

use std::fmt;
use std::ops::Deref;

use regex::Regex;
use serde_json::Value;

use super::value::{as_number, format_number, format_value, get_field, quote, values_equal, Document};

pub(crate) const OP_AND: &str = "$and";
pub(crate) const OP_OR: &str = "$or";
pub(crate) const OP_EXISTS: &str = "$exists";
pub(crate) const OP_IN: &str = "$in";
pub(crate) const OP_NOT_IN: &str = "$nin";
pub(crate) const OP_NOT_EQUAL: &str = "$ne";
pub(crate) const OP_LOWER_THAN: &str = "$lt";
pub(crate) const OP_LOWER_OR_EQUAL: &str = "$lte";
pub(crate) const OP_GREATER_THAN: &str = "$gt";
pub(crate) const OP_GREATER_OR_EQUAL: &str = "$gte";
pub(crate) const OP_REGEX: &str = "$regex";
pub(crate) const OP_ELEM_MATCH: &str = "$elemMatch";

/// A compiled `$regex` pattern, compared by its source text
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A single matchable clause
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// All sub-expressions match
    And(Vec<Expression>),
    /// At least one sub-expression matches
    Or(Vec<Expression>),
    Equal { field: String, value: Value },
    NotEqual { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    /// Field is present, even if null
    Exist { field: String },
    NotExist { field: String },
    GreaterThan { field: String, value: f64 },
    GreaterOrEqual { field: String, value: f64 },
    LowerThan { field: String, value: f64 },
    LowerOrEqual { field: String, value: f64 },
    Regex { field: String, pattern: Pattern },
    /// At least one document of the list field matches all sub-expressions
    ElemMatch { field: String, exprs: Vec<Expression> },
}

impl Expression {
    pub fn equal(field: impl Into<String>, value: Value) -> Self {
        Expression::Equal {
            field: field.into(),
            value,
        }
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Expression::In {
            field: field.into(),
            values,
        }
    }

    /// Field the expression applies to, `None` for `$and`/`$or`
    pub fn field(&self) -> Option<&str> {
        match self {
            Expression::And(_) | Expression::Or(_) => None,
            Expression::Equal { field, .. }
            | Expression::NotEqual { field, .. }
            | Expression::In { field, .. }
            | Expression::NotIn { field, .. }
            | Expression::Exist { field }
            | Expression::NotExist { field }
            | Expression::GreaterThan { field, .. }
            | Expression::GreaterOrEqual { field, .. }
            | Expression::LowerThan { field, .. }
            | Expression::LowerOrEqual { field, .. }
            | Expression::Regex { field, .. }
            | Expression::ElemMatch { field, .. } => Some(field),
        }
    }

    /// Check if a document matches this expression
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Expression::And(exprs) => exprs.iter().all(|e| e.matches(doc)),
            Expression::Or(exprs) => exprs.iter().any(|e| e.matches(doc)),
            Expression::Equal { field, value } => equal_match(field_value(doc, field), value),
            Expression::NotEqual { field, value } => !equal_match(field_value(doc, field), value),
            Expression::In { field, values } => in_match(field_value(doc, field), values),
            Expression::NotIn { field, values } => !in_match(field_value(doc, field), values),
            Expression::Exist { field } => get_field(doc, field).is_some(),
            Expression::NotExist { field } => get_field(doc, field).is_none(),
            Expression::GreaterThan { field, value } => {
                numeric_field(doc, field).map_or(false, |n| n > *value)
            }
            Expression::GreaterOrEqual { field, value } => {
                numeric_field(doc, field).map_or(false, |n| n >= *value)
            }
            Expression::LowerThan { field, value } => {
                numeric_field(doc, field).map_or(false, |n| n < *value)
            }
            Expression::LowerOrEqual { field, value } => {
                numeric_field(doc, field).map_or(false, |n| n <= *value)
            }
            Expression::Regex { field, pattern } => match get_field(doc, field) {
                Some(Value::String(s)) => pattern.is_match(s),
                _ => false,
            },
            Expression::ElemMatch { field, exprs } => match get_field(doc, field) {
                Some(Value::Array(items)) => items.iter().any(|item| match item {
                    Value::Object(sub) => exprs.iter().all(|e| e.matches(sub)),
                    _ => false,
                }),
                _ => false,
            },
        }
    }
}

fn field_value<'a>(doc: &'a Document, field: &str) -> &'a Value {
    get_field(doc, field).unwrap_or(&Value::Null)
}

fn numeric_field(doc: &Document, field: &str) -> Option<f64> {
    get_field(doc, field).and_then(as_number)
}

/// Equality also matches a scalar against any element of a list field
fn equal_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        _ => values_equal(actual, expected),
    }
}

fn in_match(actual: &Value, candidates: &[Value]) -> bool {
    match actual {
        Value::Array(items) => candidates
            .iter()
            .any(|c| items.iter().any(|item| values_equal(c, item))),
        _ => candidates.iter().any(|c| values_equal(c, actual)),
    }
}

fn join_expressions(exprs: &[Expression]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_values(values: &[Value]) -> String {
    values.iter().map(format_value).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::And(exprs) | Expression::Or(exprs) => {
                let op = if matches!(self, Expression::And(_)) { OP_AND } else { OP_OR };
                let subs: Vec<String> = exprs.iter().map(|e| format!("{{{}}}", e)).collect();
                write!(f, "{}: [{}]", op, subs.join(", "))
            }
            Expression::Equal { field, value } => write!(f, "{}: {}", quote(field), format_value(value)),
            Expression::NotEqual { field, value } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_NOT_EQUAL, format_value(value))
            }
            Expression::In { field, values } => {
                write!(f, "{}: {{{}: [{}]}}", quote(field), OP_IN, join_values(values))
            }
            Expression::NotIn { field, values } => {
                write!(f, "{}: {{{}: [{}]}}", quote(field), OP_NOT_IN, join_values(values))
            }
            Expression::Exist { field } => write!(f, "{}: {{{}: true}}", quote(field), OP_EXISTS),
            Expression::NotExist { field } => write!(f, "{}: {{{}: false}}", quote(field), OP_EXISTS),
            Expression::GreaterThan { field, value } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_GREATER_THAN, format_number(*value))
            }
            Expression::GreaterOrEqual { field, value } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_GREATER_OR_EQUAL, format_number(*value))
            }
            Expression::LowerThan { field, value } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_LOWER_THAN, format_number(*value))
            }
            Expression::LowerOrEqual { field, value } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_LOWER_OR_EQUAL, format_number(*value))
            }
            Expression::Regex { field, pattern } => {
                write!(f, "{}: {{{}: {}}}", quote(field), OP_REGEX, quote(pattern.as_str()))
            }
            Expression::ElemMatch { field, exprs } => write!(
                f,
                "{}: {{{}: {{{}}}}}",
                quote(field),
                OP_ELEM_MATCH,
                join_expressions(exprs)
            ),
        }
    }
}

/// A list of expressions joined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate(pub Vec<Expression>);

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, expr: Expression) -> Self {
        self.0.push(expr);
        self
    }

    pub fn push(&mut self, expr: Expression) {
        self.0.push(expr);
    }

    /// Check if a document matches all expressions; the empty predicate
    /// matches everything
    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|e| e.matches(doc))
    }

    /// The id of a lookup by id (`{id: x}` and nothing else)
    pub fn single_id(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [Expression::Equal { field, value }] if field == "id" => Some(value),
            _ => None,
        }
    }

    /// The ids of a lookup by ids (`{id: {$in: [...]}}` and nothing else)
    pub fn id_list(&self) -> Option<&[Value]> {
        match self.0.as_slice() {
            [Expression::In { field, values }] if field == "id" => Some(values),
            _ => None,
        }
    }
}

impl Deref for Predicate {
    type Target = [Expression];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Expression>> for Predicate {
    fn from(exprs: Vec<Expression>) -> Self {
        Predicate(exprs)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", join_expressions(&self.0))
    }
}

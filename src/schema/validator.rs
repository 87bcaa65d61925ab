//! Field validator capability
//!
//! The query engine does not own a type system. Field types plug in through
//! the [`Validator`] trait: the engine calls it to coerce query literals and
//! projection params, to serialize values for output and to order values.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Projection field params, in declaration order
pub type Params = Map<String, Value>;

/// Returns true only when `value` is strictly less than `other`
pub type LessFunc = fn(value: &Value, other: &Value) -> bool;

/// Transform applied to a field value when the projection passes params
pub type FieldHandler = Arc<dyn Fn(&Value, &Params) -> Result<Value, String> + Send + Sync>;

/// A field type validator.
///
/// Only `validate` is required. The other methods have defaults describing
/// a type with no query-specific rules, no ordering, and no serialization.
pub trait Validator: Send + Sync {
    /// Validate and normalize a value
    fn validate(&self, value: &Value) -> Result<Value, String>;

    /// Lighter validation used for query literals.
    ///
    /// Types with constraints that make no sense for filters (length limits,
    /// patterns...) override this; by default it is `validate`.
    fn validate_query(&self, value: &Value) -> Result<Value, String> {
        self.validate(value)
    }

    /// Whether comparison operators (`$gt`, `$lte`...) apply to this type
    fn is_numeric(&self) -> bool {
        false
    }

    /// Ordering used when sorting on this field, `None` when not comparable
    fn less_func(&self) -> Option<LessFunc> {
        None
    }

    /// Convert a stored value to its output representation
    fn serialize(&self, value: Value) -> Result<Value, String> {
        Ok(value)
    }
}

/// A parameter a field accepts in projections
#[derive(Clone, Default)]
pub struct Param {
    /// Validator coercing the raw param literal
    pub validator: Option<Arc<dyn Validator>>,
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(validator: impl Validator + 'static) -> Self {
        Self {
            validator: Some(Arc::new(validator)),
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

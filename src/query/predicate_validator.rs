//! Predicate validation against field capabilities
//!
//! Validation checks that every field exists and is filterable, then coerces
//! literals through the field validator. Coerced values replace the parsed
//! ones, so a validated predicate carries normalized values.

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::predicate::*;
use super::value::{as_number, format_value, number_value};
use crate::schema::{Field, FieldGetter, FieldKind};

impl Predicate {
    /// Validate every expression in order; the first failure wins
    pub fn validate(&mut self, fields: &dyn FieldGetter) -> QueryResult<()> {
        validate_expressions(&mut self.0, fields)
    }
}

fn validate_expressions(exprs: &mut [Expression], fields: &dyn FieldGetter) -> QueryResult<()> {
    for expr in exprs.iter_mut() {
        expr.validate(fields)?;
    }
    Ok(())
}

impl Expression {
    pub fn validate(&mut self, fields: &dyn FieldGetter) -> QueryResult<()> {
        match self {
            Expression::And(exprs) | Expression::Or(exprs) => validate_expressions(exprs, fields),
            Expression::Equal { field, value } | Expression::NotEqual { field, value } => {
                let def = filterable_field(fields, field)?;
                *value = coerce_value(def, field, value)?;
                Ok(())
            }
            Expression::In { field, values } | Expression::NotIn { field, values } => {
                let def = filterable_field(fields, field)?;
                if let Some(validator) = &def.validator {
                    for value in values.iter_mut() {
                        *value = validator.validate_query(value).map_err(|e| {
                            QueryError::validation(format!(
                                "{}: invalid query expression `{}': {}",
                                field,
                                format_value(value),
                                e
                            ))
                        })?;
                    }
                }
                Ok(())
            }
            Expression::Exist { field } | Expression::NotExist { field } => {
                filterable_field(fields, field).map(|_| ())
            }
            Expression::Regex { field, pattern } => {
                let def = filterable_field(fields, field)?;
                coerce_value(def, field, &Value::String(pattern.as_str().to_string())).map(|_| ())
            }
            Expression::GreaterThan { field, value } => {
                coerce_bound(fields, field, value, OP_GREATER_THAN)
            }
            Expression::GreaterOrEqual { field, value } => {
                coerce_bound(fields, field, value, OP_GREATER_OR_EQUAL)
            }
            Expression::LowerThan { field, value } => {
                coerce_bound(fields, field, value, OP_LOWER_THAN)
            }
            Expression::LowerOrEqual { field, value } => {
                coerce_bound(fields, field, value, OP_LOWER_OR_EQUAL)
            }
            Expression::ElemMatch { field, exprs } => {
                let def = filterable_field(fields, field)?;
                let element = match &def.kind {
                    FieldKind::Array(element) => element,
                    _ => return Err(QueryError::validation(format!("{}: is not an array", field))),
                };
                let schema = match &element.kind {
                    FieldKind::Object(schema) => schema.clone(),
                    _ => {
                        return Err(QueryError::validation(format!(
                            "{}: array elements are not documents",
                            field
                        )))
                    }
                };
                validate_expressions(exprs, schema.as_ref()).map_err(|e| e.within(field))
            }
        }
    }
}

/// Look up a field and check it can be used in a predicate
fn filterable_field<'a>(fields: &'a dyn FieldGetter, name: &str) -> QueryResult<&'a Field> {
    let def = fields
        .get_field(name)
        .ok_or_else(|| QueryError::validation(format!("{}: unknown query field", name)))?;
    if !def.filterable {
        return Err(QueryError::validation(format!(
            "{}: field is not filterable",
            name
        )));
    }
    Ok(def)
}

/// Check a comparison applies to the field, then coerce its bound through
/// the field validator. The bound stays a float.
fn coerce_bound(fields: &dyn FieldGetter, name: &str, bound: &mut f64, op: &str) -> QueryResult<()> {
    let def = filterable_field(fields, name)?;
    if def.validator.is_some() && !def.is_numeric() {
        return Err(QueryError::validation(format!(
            "{}: cannot apply {} operation on a non numerical field",
            name, op
        )));
    }
    let value = number_value(*bound).ok_or_else(|| {
        QueryError::validation(format!("{}: invalid query expression: not a number", name))
    })?;
    let coerced = coerce_value(def, name, &value)?;
    *bound = as_number(&coerced).ok_or_else(|| {
        QueryError::validation(format!(
            "{}: invalid query expression: {} is not a number",
            name,
            format_value(&coerced)
        ))
    })?;
    Ok(())
}

fn coerce_value(def: &Field, name: &str, value: &Value) -> QueryResult<Value> {
    match &def.validator {
        Some(validator) => validator.validate_query(value).map_err(|e| {
            QueryError::validation(format!("{}: invalid query expression: {}", name, e))
        }),
        None => Ok(value.clone()),
    }
}

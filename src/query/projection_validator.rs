//! Projection validation against field capabilities
//!
//! Param values are coerced in place by their validator, so the evaluator
//! only ever sees normalized params.

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::predicate::Predicate;
use super::projection::{Projection, ProjectionField};
use super::sort::Sort;
use crate::schema::{Field, FieldGetter, FieldKind};

/// Params every connection field accepts
pub(crate) const CONNECTION_PARAMS: [&str; 5] = ["filter", "sort", "page", "limit", "skip"];

impl Projection {
    pub fn validate(&mut self, fields: &dyn FieldGetter) -> QueryResult<()> {
        for pf in self.0.iter_mut() {
            pf.validate(fields)?;
        }
        Ok(())
    }
}

impl ProjectionField {
    pub fn validate(&mut self, fields: &dyn FieldGetter) -> QueryResult<()> {
        if self.is_wildcard() {
            if self.alias.is_some() {
                return Err(QueryError::validation(format!(
                    "{}: can't have an alias",
                    self.name
                )));
            }
            return Ok(());
        }

        let def = fields
            .get_field(&self.name)
            .ok_or_else(|| QueryError::validation(format!("{}: unknown field", self.name)))?;
        if def.hidden {
            return Err(QueryError::validation(format!("{}: hidden field", self.name)));
        }

        if let Some(children) = self.children.as_mut() {
            let schema = children_schema(def)
                .ok_or_else(|| QueryError::validation(format!("{}: field has no children", self.name)))?;
            children
                .validate(schema)
                .map_err(|e| e.within(&self.name))?;
        }

        if !self.params.is_empty() {
            self.validate_params(def)?;
        }
        Ok(())
    }

    fn validate_params(&mut self, def: &Field) -> QueryResult<()> {
        let connection = match &def.kind {
            FieldKind::Connection(conn) => Some(conn),
            _ => None,
        };
        if def.params.is_empty() && connection.is_none() {
            return Err(QueryError::validation(format!(
                "{}: params not allowed",
                self.name
            )));
        }
        for (name, value) in self.params.iter_mut() {
            let invalid = |err: String| {
                QueryError::validation(format!(
                    "{}: invalid param `{}' value: {}",
                    self.name, name, err
                ))
            };
            if let Some(param) = def.params.get(name) {
                if let Some(validator) = &param.validator {
                    *value = validator.validate(value).map_err(invalid)?;
                }
                continue;
            }
            match connection {
                Some(conn) if CONNECTION_PARAMS.contains(&name.as_str()) => {
                    *value = validate_connection_param(name, value, conn.schema.as_ref())
                        .map_err(invalid)?;
                }
                _ => {
                    return Err(QueryError::validation(format!(
                        "{}: unsupported param name: {}",
                        self.name, name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Field capabilities children of `def` are validated against
fn children_schema(def: &Field) -> Option<&dyn FieldGetter> {
    match &def.kind {
        FieldKind::Object(schema) => Some(schema.as_ref()),
        FieldKind::Reference(reference) => Some(reference.schema.as_ref()),
        FieldKind::Connection(conn) => Some(conn.schema.as_ref()),
        FieldKind::Array(element) => match &element.kind {
            FieldKind::Object(schema) => Some(schema.as_ref()),
            FieldKind::Reference(reference) => Some(reference.schema.as_ref()),
            _ => None,
        },
        FieldKind::Scalar => None,
    }
}

/// Check a connection param: `filter` and `sort` must parse and fit the
/// connection schema, `page`, `limit` and `skip` are integers within the
/// `i64` range.
fn validate_connection_param(
    name: &str,
    value: &Value,
    schema: &dyn FieldGetter,
) -> Result<Value, String> {
    match name {
        "filter" => {
            let text = value.as_str().ok_or("not a string")?;
            let mut predicate = Predicate::parse(text).map_err(|e| e.to_string())?;
            predicate.validate(schema).map_err(|e| e.to_string())?;
            Ok(value.clone())
        }
        "sort" => {
            let text = value.as_str().ok_or("not a string")?;
            let sort = Sort::parse(text).map_err(|e| e.to_string())?;
            sort.validate(schema).map_err(|e| e.to_string())?;
            Ok(value.clone())
        }
        _ => {
            let n = value.as_f64().ok_or("not an integer")?;
            if n.fract() != 0.0 {
                return Err("not an integer".to_string());
            }
            if n.abs() >= i64::MAX as f64 {
                return Err("out of range".to_string());
            }
            if name != "limit" && n < 0.0 {
                return Err("must be positive".to_string());
            }
            Ok(Value::from(n as i64))
        }
    }
}

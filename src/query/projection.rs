//! # Projections
//!
//! A projection lists the fields to keep in a document and how to render
//! them. It uses a GraphQL-like syntax:
//!
//! ```text
//! id,name,thumb:picture(size:80),author{name,email},posts(limit:5){title}
//! ```
//!
//! An empty projection keeps every field as is.

use std::fmt;

use serde_json::Value;

use super::value::{format_number, quote};
use crate::schema::Params;

/// Selects every field not explicitly selected
pub const WILDCARD: &str = "*";

/// How one field is represented in the output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionField {
    /// Field name as defined in the schema
    pub name: String,
    /// Output key, the name when unset
    pub alias: Option<String>,
    /// Params passed to the field handler
    pub params: Params,
    /// Child projection. `Some` with an empty projection embeds the whole
    /// sub-document.
    pub children: Option<Projection>,
}

impl ProjectionField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_children(mut self, children: Projection) -> Self {
        self.children = Some(children);
        self
    }

    /// Key the field is written under
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }
}

/// Ordered list of projected fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection(pub Vec<ProjectionField>);

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectionField> {
        self.0.iter()
    }
}

impl From<Vec<ProjectionField>> for Projection {
    fn from(fields: Vec<ProjectionField>) -> Self {
        Projection(fields)
    }
}

fn format_param(value: &Value) -> String {
    match value {
        Value::String(s) => quote(s),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

impl fmt::Display for ProjectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}:", alias)?;
        }
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let mut names: Vec<&String> = self.params.keys().collect();
            names.sort();
            let params: Vec<String> = names
                .into_iter()
                .map(|name| format!("{}:{}", name, format_param(&self.params[name.as_str()])))
                .collect();
            write!(f, "({})", params.join(","))?;
        }
        if let Some(children) = &self.children {
            write!(f, "{{{}}}", children)?;
        }
        Ok(())
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.0.iter().map(|pf| pf.to_string()).collect();
        f.write_str(&fields.join(","))
    }
}

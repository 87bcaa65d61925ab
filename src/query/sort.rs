//! Sort expressions: `field,-other` sorts on `field` ascending then `other`
//! descending.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::value::{get_field, Document};
use crate::schema::{FieldGetter, LessFunc};

/// One sort criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Name of the field to sort on
    pub name: String,
    /// Sort descending when set
    pub reversed: bool,
}

impl SortField {
    pub fn new(name: impl Into<String>, reversed: bool) -> Self {
        Self {
            name: name.into(),
            reversed,
        }
    }
}

/// Ordered list of sort criteria, the first one being the primary key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort(pub Vec<SortField>);

impl Sort {
    /// Parse a comma separated list of field names, each optionally
    /// prefixed by `-` for a descending order. Blank input is no sort.
    pub fn parse(text: &str) -> QueryResult<Sort> {
        let mut sort = Vec::new();
        if text.trim().is_empty() {
            return Ok(Sort(sort));
        }
        for part in text.split(',') {
            let name = part.trim();
            if name.is_empty() || name == "-" {
                return Err(QueryError::parse("empty sort field"));
            }
            match name.strip_prefix('-') {
                Some(name) => sort.push(SortField::new(name, true)),
                None => sort.push(SortField::new(name, false)),
            }
        }
        Ok(Sort(sort))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check every field exists and is sortable
    pub fn validate(&self, fields: &dyn FieldGetter) -> QueryResult<()> {
        for sf in &self.0 {
            let def = fields.get_field(&sf.name).ok_or_else(|| {
                QueryError::validation(format!("invalid sort field: {}", sf.name))
            })?;
            if !def.sortable {
                return Err(QueryError::validation(format!(
                    "field is not sortable: {}",
                    sf.name
                )));
            }
        }
        Ok(())
    }

    /// Order documents in place. Each field is compared with its validator's
    /// less function when it has one, by number or string otherwise. Missing
    /// values sort first.
    pub fn apply(&self, docs: &mut [Document], fields: &dyn FieldGetter) {
        if self.0.is_empty() {
            return;
        }
        let keys: Vec<(&str, bool, Option<LessFunc>)> = self
            .0
            .iter()
            .map(|sf| {
                let less = fields
                    .get_field(&sf.name)
                    .and_then(|f| f.validator.as_ref())
                    .and_then(|v| v.less_func());
                (sf.name.as_str(), sf.reversed, less)
            })
            .collect();
        docs.sort_by(|a, b| {
            for (name, reversed, less) in &keys {
                let ord = compare(get_field(a, name), get_field(b, name), *less);
                let ord = if *reversed { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>, less: Option<LessFunc>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };
    let less = less.unwrap_or(default_less);
    if less(a, b) {
        Ordering::Less
    } else if less(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

fn default_less(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x < y,
        (Value::Bool(x), Value::Bool(y)) => x < y,
        _ => false,
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|sf| {
                if sf.reversed {
                    format!("-{}", sf.name)
                } else {
                    sf.name.clone()
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

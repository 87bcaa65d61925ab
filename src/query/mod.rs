//! Query engine
//!
//! A [`Query`] is composed of:
//!
//! - a [`Projection`] defining the shape of the returned documents
//! - a [`Predicate`] defining the criteria documents must match
//! - a [`Sort`] ordering the result set
//! - an optional [`Window`] slicing the result set
//!
//! Each part has a text form: projections use a GraphQL-like syntax,
//! predicates a subset of the MongoDB query syntax, sorts a comma separated
//! list of fields.
//!
//! # Usage
//!
//! ```ignore
//! use aeroquery::query::{Query, Window};
//!
//! let mut query = Query::new("id,author{name}", r#"{status: "published"}"#, "-date", Window::page(1, 10, 0))?;
//! query.validate(&schema)?;
//! ```

mod errors;
mod predicate;
mod predicate_json;
mod predicate_parser;
mod predicate_validator;
mod projection;
mod projection_evaluator;
mod projection_parser;
mod projection_validator;
mod resolver;
mod resource;
mod sort;
mod value;
mod window;

pub use errors::{QueryError, QueryResult};
pub use predicate::{Expression, Pattern, Predicate};
pub use predicate_parser::parse_predicate;
pub use projection::{Projection, ProjectionField, WILDCARD};
pub use projection_evaluator::ProjectionEvaluator;
pub use projection_parser::parse_projection;
pub use resolver::{ReferenceResolver, Resolved};
pub use resource::{Resource, ResourceResolver};
pub use sort::{Sort, SortField};
pub use value::{get_field, values_equal, Document};
pub use window::Window;

use crate::schema::FieldGetter;

/// Criteria of a query on a resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub projection: Projection,
    pub predicate: Predicate,
    pub sort: Sort,
    /// Full result set when unset
    pub window: Option<Window>,
}

impl Query {
    /// Build a query from the text forms of its parts
    pub fn new(projection: &str, predicate: &str, sort: &str, window: Option<Window>) -> QueryResult<Query> {
        Ok(Query {
            projection: Projection::parse(projection)?,
            predicate: Predicate::parse(predicate)?,
            sort: Sort::parse(sort)?,
            window,
        })
    }

    /// Query selecting all fields of the documents matching `predicate`
    pub fn from_predicate(predicate: Predicate) -> Query {
        Query {
            predicate,
            ..Query::default()
        }
    }

    /// Validate every part against the resource fields: projection, then
    /// predicate, then sort
    pub fn validate(&mut self, fields: &dyn FieldGetter) -> QueryResult<()> {
        self.projection.validate(fields)?;
        self.predicate.validate(fields)?;
        self.sort.validate(fields)
    }

    /// Match, order and window documents in memory
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>, fields: &dyn FieldGetter) -> Vec<Document> {
        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.predicate.matches(doc))
            .collect();
        self.sort.apply(&mut matched, fields);
        match &self.window {
            Some(window) => window.apply(matched),
            None => matched,
        }
    }
}

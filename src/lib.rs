//! aeroquery - Query engine for JSON document resources
//!
//! Parses, validates and evaluates the three query languages a REST layer
//! exposes on its resources: projections, predicates and sorts.

pub mod config;
pub mod observability;
pub mod query;
pub mod schema;

pub use config::EngineConfig;
pub use query::{
    Document, Expression, Predicate, Projection, ProjectionEvaluator, Query, QueryError, QueryResult,
    ReferenceResolver, Resolved, Resource, ResourceResolver, Sort, Window,
};

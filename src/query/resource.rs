//! Resource adapter
//!
//! Storage layers expose their collections as [`Resource`]s. A
//! [`ResourceResolver`] turns a resource tree into a [`ReferenceResolver`]
//! for projection evaluation.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::projection_evaluator::ProjectionEvaluator;
use super::resolver::{ReferenceResolver, Resolved};
use super::value::Document;
use super::Query;
use crate::schema::FieldGetter;

/// A queryable collection of documents
pub trait Resource: Send + Sync {
    /// Documents matching the query, ordered and windowed
    fn find<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, QueryResult<Vec<Document>>>;

    /// Documents by id, in the order of `ids`, `None` for unknown ids
    fn multi_get<'a>(&'a self, ids: &'a [Value]) -> BoxFuture<'a, QueryResult<Vec<Option<Document>>>>;

    /// Resource at `path`
    fn sub_resource<'a>(&'a self, path: &'a str) -> BoxFuture<'a, QueryResult<Arc<dyn Resource>>>;

    /// Field capabilities of the documents
    fn fields(&self) -> Arc<dyn FieldGetter>;
}

/// Resolves references by looking up resources from a root resource.
///
/// Lookups by a list of ids with no sort nor window go through
/// [`Resource::multi_get`], everything else through [`Resource::find`].
pub struct ResourceResolver {
    root: Arc<dyn Resource>,
}

impl ResourceResolver {
    pub fn new(root: Arc<dyn Resource>) -> Self {
        Self { root }
    }
}

impl ReferenceResolver for ResourceResolver {
    fn resolve<'a>(&'a self, path: &'a str, query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>> {
        Box::pin(async move {
            let resource = self.root.sub_resource(path).await?;
            let items = match query.predicate.id_list() {
                Some(ids) if query.sort.is_empty() && query.window.is_none() => {
                    let found = resource.multi_get(ids).await?;
                    if found.len() != ids.len() {
                        return Err(QueryError::Internal(format!(
                            "invalid number of items returned by multi_get on {}: {} for {} ids",
                            path,
                            found.len(),
                            ids.len()
                        )));
                    }
                    found.into_iter().flatten().collect()
                }
                _ => resource.find(query).await?,
            };
            Ok(Resolved {
                items,
                fields: resource.fields(),
            })
        })
    }
}

impl ProjectionEvaluator {
    /// Evaluator resolving references from the resources under `root`
    pub fn for_resource(root: Arc<dyn Resource>) -> Self {
        ProjectionEvaluator::new(Arc::new(ResourceResolver::new(root)))
    }
}

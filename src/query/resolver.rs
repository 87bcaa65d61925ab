//! # Reference Resolution
//!
//! Projection evaluation never fetches other resources inline. Each
//! reference or connection registers a pending request with a continuation;
//! the batch resolver then runs resolution passes:
//!
//! 1. Drain the pending requests
//! 2. Execute them concurrently, one task per request
//! 3. Each task calls the resolver once, then its continuation(s)
//! 4. Continuations may register new requests for the next pass
//!
//! Lookups of a single id on the same resource path are coalesced into one
//! multi-get per pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinSet;

use super::errors::{QueryError, QueryResult};
use super::predicate::{Expression, Predicate};
use super::value::{values_equal, Document};
use super::Query;
use crate::observability::{log_event, Event, Logger};
use crate::schema::FieldGetter;

/// Items returned for a request, with the field capabilities of their resource
#[derive(Clone)]
pub struct Resolved {
    pub items: Vec<Document>,
    pub fields: Arc<dyn FieldGetter>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

/// Fetches the documents of another resource
pub trait ReferenceResolver: Send + Sync {
    /// Run `query` on the resource at `path`
    fn resolve<'a>(&'a self, path: &'a str, query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>>;
}

/// Called with the resolved items of a request
pub(crate) type Continuation = Box<dyn FnOnce(Resolved) -> QueryResult<()> + Send>;

enum PendingRequest {
    Single {
        path: String,
        query: Query,
        then: Continuation,
    },
    /// Coalesced single-id lookups, each id with its own continuation
    MultiGet {
        path: String,
        waiting: Vec<(Value, Continuation)>,
    },
}

impl PendingRequest {
    async fn execute(self, resolver: &dyn ReferenceResolver) -> QueryResult<()> {
        match self {
            PendingRequest::Single { path, query, then } => {
                let resolved = resolver.resolve(&path, &query).await?;
                then(resolved)
            }
            PendingRequest::MultiGet { path, waiting } => {
                let mut ids: Vec<Value> = Vec::with_capacity(waiting.len());
                for (id, _) in &waiting {
                    if !ids.iter().any(|known| values_equal(known, id)) {
                        ids.push(id.clone());
                    }
                }
                let query = Query::from_predicate(Predicate(vec![Expression::in_list("id", ids)]));
                let resolved = resolver.resolve(&path, &query).await?;
                for (id, then) in waiting {
                    let items = resolved
                        .items
                        .iter()
                        .find(|item| item.get("id").map_or(false, |v| values_equal(v, &id)))
                        .cloned()
                        .into_iter()
                        .collect();
                    then(Resolved {
                        items,
                        fields: resolved.fields.clone(),
                    })?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct Pending {
    requests: Vec<PendingRequest>,
    /// Index in `requests` of the multi-get of each resource path
    multi_gets: HashMap<String, usize>,
}

/// Collects pending requests and executes them pass after pass
pub(crate) struct ReferenceBatchResolver {
    pending: Mutex<Pending>,
    coalesce: bool,
}

impl ReferenceBatchResolver {
    pub(crate) fn new(coalesce: bool) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            coalesce,
        }
    }

    /// Register a request for the next pass
    pub(crate) fn request(&self, path: &str, query: Query, then: Continuation) -> QueryResult<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| QueryError::Internal("lock poisoned".to_string()))?;
        let single_id = match query.predicate.single_id() {
            Some(id) if self.coalesce && query.sort.is_empty() && query.window.is_none() => {
                Some(id.clone())
            }
            _ => None,
        };
        let Some(id) = single_id else {
            pending.requests.push(PendingRequest::Single {
                path: path.to_string(),
                query,
                then,
            });
            return Ok(());
        };
        let existing = pending.multi_gets.get(path).copied();
        if let Some(index) = existing {
            if let Some(PendingRequest::MultiGet { waiting, .. }) = pending.requests.get_mut(index) {
                waiting.push((id, then));
                return Ok(());
            }
        }
        let index = pending.requests.len();
        pending.requests.push(PendingRequest::MultiGet {
            path: path.to_string(),
            waiting: vec![(id, then)],
        });
        pending.multi_gets.insert(path.to_string(), index);
        Ok(())
    }

    /// Number of requests waiting for the next pass
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().map_or(0, |p| p.requests.len())
    }

    fn drain(&self) -> QueryResult<Vec<PendingRequest>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| QueryError::Internal("lock poisoned".to_string()))?;
        pending.multi_gets.clear();
        Ok(std::mem::take(&mut pending.requests))
    }

    /// Run passes until no request is pending. Returns the number of passes.
    ///
    /// Every task of a pass is joined before the first error of the pass is
    /// returned. Dropping the returned future aborts the running tasks.
    pub(crate) async fn execute(
        &self,
        resolver: Arc<dyn ReferenceResolver>,
        logger: &Logger,
    ) -> QueryResult<usize> {
        let mut passes = 0;
        loop {
            let requests = self.drain()?;
            if requests.is_empty() {
                return Ok(passes);
            }
            passes += 1;
            let count = requests.len();

            let mut tasks = JoinSet::new();
            for request in requests {
                let resolver = resolver.clone();
                tasks.spawn(async move { request.execute(resolver.as_ref()).await });
            }

            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                let result = joined
                    .map_err(|e| QueryError::Internal(format!("resolution task failed: {}", e)))
                    .and_then(|r| r);
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }

            let pass = passes.to_string();
            if let Some(err) = first_error {
                let message = err.to_string();
                log_event(logger, Event::ResolutionFailed, &[("pass", &pass), ("error", &message)]);
                return Err(err);
            }
            let count = count.to_string();
            log_event(logger, Event::ResolutionPass, &[("pass", &pass), ("requests", &count)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `{"id": x, "name": "item-x"}` for any id, counting calls
    #[derive(Default)]
    struct EchoResolver {
        calls: AtomicUsize,
        queries: Mutex<Vec<(String, Query)>>,
    }

    impl ReferenceResolver for EchoResolver {
        fn resolve<'a>(&'a self, path: &'a str, query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.queries.lock().unwrap().push((path.to_string(), query.clone()));
                let ids: Vec<Value> = match query.predicate.id_list() {
                    Some(ids) => ids.to_vec(),
                    None => query.predicate.single_id().into_iter().cloned().collect(),
                };
                let items = ids
                    .into_iter()
                    .filter(|id| id != &json!("missing"))
                    .map(|id| {
                        let name = format!("item-{}", id.as_str().unwrap_or_default());
                        json!({"id": id, "name": name}).as_object().cloned().unwrap()
                    })
                    .collect();
                Ok(Resolved {
                    items,
                    fields: Schema::new().into_shared(),
                })
            })
        }
    }

    struct FailingResolver;

    impl ReferenceResolver for FailingResolver {
        fn resolve<'a>(&'a self, _path: &'a str, _query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>> {
            Box::pin(async move {
                Err(QueryError::resolver(io::Error::new(io::ErrorKind::Other, "backend down")))
            })
        }
    }

    /// Fails at once on `broken`, answers other paths after a delay
    struct SlowSiblingResolver;

    impl ReferenceResolver for SlowSiblingResolver {
        fn resolve<'a>(&'a self, path: &'a str, _query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>> {
            Box::pin(async move {
                if path == "broken" {
                    return Err(QueryError::resolver(io::Error::new(io::ErrorKind::Other, "broken backend")));
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(Resolved {
                    items: vec![json!({"id": "slow"}).as_object().cloned().unwrap()],
                    fields: Arc::new(Schema::new()),
                })
            })
        }
    }

    fn by_id(id: &str) -> Query {
        Query::from_predicate(Predicate(vec![Expression::equal("id", json!(id))]))
    }

    fn collect_into(out: &Arc<Mutex<Vec<Vec<Document>>>>) -> Continuation {
        let out = out.clone();
        Box::new(move |resolved: Resolved| {
            out.lock().unwrap().push(resolved.items);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_coalesces_single_id_lookups() {
        let batch = ReferenceBatchResolver::new(true);
        let out = Arc::new(Mutex::new(Vec::new()));
        batch.request("users", by_id("a"), collect_into(&out)).unwrap();
        batch.request("users", by_id("b"), collect_into(&out)).unwrap();
        batch.request("posts", by_id("c"), collect_into(&out)).unwrap();
        assert_eq!(batch.pending_count(), 2);

        let resolver = Arc::new(EchoResolver::default());
        let passes = batch.execute(resolver.clone(), &Logger::discard()).await.unwrap();
        assert_eq!(passes, 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);

        let mut names: Vec<String> = out
            .lock()
            .unwrap()
            .iter()
            .map(|items| items[0]["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["item-a", "item-b", "item-c"]);
    }

    #[tokio::test]
    async fn test_coalescing_disabled() {
        let batch = ReferenceBatchResolver::new(false);
        let out = Arc::new(Mutex::new(Vec::new()));
        batch.request("users", by_id("a"), collect_into(&out)).unwrap();
        batch.request("users", by_id("b"), collect_into(&out)).unwrap();
        assert_eq!(batch.pending_count(), 2);

        let resolver = Arc::new(EchoResolver::default());
        batch.execute(resolver.clone(), &Logger::discard()).await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_multi_get_missing_id_gets_no_items() {
        let batch = ReferenceBatchResolver::new(true);
        let out = Arc::new(Mutex::new(Vec::new()));
        batch.request("users", by_id("missing"), collect_into(&out)).unwrap();
        batch.request("users", by_id("a"), collect_into(&out)).unwrap();

        let resolver = Arc::new(EchoResolver::default());
        batch.execute(resolver.clone(), &Logger::discard()).await.unwrap();
        let out = out.lock().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|items| items.is_empty()));

        let queries = resolver.queries.lock().unwrap();
        assert_eq!(queries[0].1.predicate.id_list().map(|ids| ids.len()), Some(2));
    }

    #[tokio::test]
    async fn test_continuations_schedule_next_pass() {
        let batch = Arc::new(ReferenceBatchResolver::new(true));
        let out = Arc::new(Mutex::new(Vec::new()));
        let next = batch.clone();
        let nested = collect_into(&out);
        batch
            .request(
                "users",
                by_id("a"),
                Box::new(move |_resolved: Resolved| next.request("users", by_id("b"), nested)),
            )
            .unwrap();

        let resolver = Arc::new(EchoResolver::default());
        let (logger, buffer) = Logger::memory(crate::observability::Severity::Trace);
        let passes = batch.execute(resolver.clone(), &logger).await.unwrap();
        assert_eq!(passes, 2);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.lock().unwrap()[0][0]["id"], json!("b"));
        assert_eq!(buffer.lines().len(), 2);
        assert!(buffer.lines()[0].contains("QUERY_RESOLUTION_PASS"));
    }

    #[tokio::test]
    async fn test_error_returned_after_pass_joins() {
        let batch = ReferenceBatchResolver::new(true);
        let out = Arc::new(Mutex::new(Vec::new()));
        batch.request("users", by_id("a"), collect_into(&out)).unwrap();
        batch
            .request(
                "posts",
                Query::from_predicate(Predicate(vec![Expression::equal("author", json!("a"))])),
                collect_into(&out),
            )
            .unwrap();

        let (logger, buffer) = Logger::memory(crate::observability::Severity::Trace);
        let err = batch
            .execute(Arc::new(FailingResolver), &logger)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend down");
        assert_eq!(batch.pending_count(), 0);
        assert!(buffer.contents().contains("QUERY_RESOLUTION_FAILED"));
    }

    #[tokio::test]
    async fn test_failed_pass_waits_for_siblings() {
        let batch = ReferenceBatchResolver::new(false);
        let out = Arc::new(Mutex::new(Vec::new()));
        batch.request("broken", by_id("a"), collect_into(&out)).unwrap();
        batch.request("users", by_id("b"), collect_into(&out)).unwrap();

        let err = batch
            .execute(Arc::new(SlowSiblingResolver), &Logger::discard())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "broken backend");

        let out = out.lock().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0]["id"], json!("slow"));
    }
}

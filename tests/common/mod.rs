//! Shared test fixtures: an in-memory blog store
//!
//! users, posts and comments live in [`MemoryResource`]s reachable from a
//! [`MemoryStore`] root. Every lookup is recorded so tests can count calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use aeroquery::query::{values_equal, Document, Query, QueryError, QueryResult, Resource};
use aeroquery::schema::{Field, FieldGetter, Schema};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("test document must be an object")
}

/// A flat collection of documents
pub struct MemoryResource {
    path: String,
    docs: Vec<Document>,
    schema: Arc<dyn FieldGetter>,
    calls: CallLog,
}

impl Resource for MemoryResource {
    fn find<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("find {}", self.path));
            Ok(query.apply(self.docs.clone(), self.schema.as_ref()))
        })
    }

    fn multi_get<'a>(&'a self, ids: &'a [Value]) -> BoxFuture<'a, QueryResult<Vec<Option<Document>>>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("multi_get {}", self.path));
            Ok(ids
                .iter()
                .map(|id| {
                    self.docs
                        .iter()
                        .find(|d| d.get("id").map_or(false, |v| values_equal(v, id)))
                        .cloned()
                })
                .collect())
        })
    }

    fn sub_resource<'a>(&'a self, path: &'a str) -> BoxFuture<'a, QueryResult<Arc<dyn Resource>>> {
        Box::pin(async move { Err(unknown_resource(path)) })
    }

    fn fields(&self) -> Arc<dyn FieldGetter> {
        self.schema.clone()
    }
}

/// Root resource routing paths to collections
pub struct MemoryStore {
    resources: HashMap<String, Arc<MemoryResource>>,
    pub calls: CallLog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with(mut self, path: &str, schema: Arc<dyn FieldGetter>, docs: Vec<Value>) -> Self {
        let resource = MemoryResource {
            path: path.to_string(),
            docs: docs.into_iter().map(doc).collect(),
            schema,
            calls: self.calls.clone(),
        };
        self.resources.insert(path.to_string(), Arc::new(resource));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Resource for MemoryStore {
    fn find<'a>(&'a self, _query: &'a Query) -> BoxFuture<'a, QueryResult<Vec<Document>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn multi_get<'a>(&'a self, ids: &'a [Value]) -> BoxFuture<'a, QueryResult<Vec<Option<Document>>>> {
        Box::pin(async move { Ok(vec![None; ids.len()]) })
    }

    fn sub_resource<'a>(&'a self, path: &'a str) -> BoxFuture<'a, QueryResult<Arc<dyn Resource>>> {
        Box::pin(async move {
            match self.resources.get(path) {
                Some(resource) => Ok(resource.clone() as Arc<dyn Resource>),
                None => Err(unknown_resource(path)),
            }
        })
    }

    fn fields(&self) -> Arc<dyn FieldGetter> {
        Schema::new().into_shared()
    }
}

fn unknown_resource(path: &str) -> QueryError {
    QueryError::resolver(io::Error::new(
        io::ErrorKind::NotFound,
        format!("unknown resource: {}", path),
    ))
}

// =============================================================================
// Blog Fixture
// =============================================================================

/// Users as seen through a reference: no further links
pub fn user_summary_schema() -> Arc<dyn FieldGetter> {
    Schema::new()
        .field("id", Field::new().filterable().sortable())
        .field("name", Field::new().filterable())
        .into_shared()
}

pub fn users_schema() -> Arc<dyn FieldGetter> {
    Schema::new()
        .field("id", Field::new().filterable().sortable())
        .field("name", Field::new().filterable())
        .field("password", Field::new().hidden())
        .field("friend", Field::reference("users", user_summary_schema()))
        .field("friends", Field::array(Field::reference("users", user_summary_schema())))
        .into_shared()
}

pub fn comments_schema() -> Arc<dyn FieldGetter> {
    Schema::new()
        .field("id", Field::new().filterable().sortable())
        .field("post", Field::new().filterable())
        .field("body", Field::new())
        .field("rank", Field::new().filterable().sortable())
        .into_shared()
}

pub fn posts_schema() -> Arc<dyn FieldGetter> {
    Schema::new()
        .field("id", Field::new().filterable().sortable())
        .field("title", Field::new().filterable())
        .field("author", Field::reference("users", users_schema()))
        .field("editor", Field::reference("users", users_schema()))
        .field("tags", Field::array(Field::new()))
        .field(
            "meta",
            Field::object(
                Schema::new()
                    .field("views", Field::new())
                    .field("draft", Field::new()),
            ),
        )
        .field("comments", Field::connection("comments", "post", comments_schema()))
        .into_shared()
}

pub fn blog_store() -> MemoryStore {
    MemoryStore::new()
        .with(
            "users",
            users_schema(),
            vec![
                json!({"id": 1, "name": "Ann", "password": "s3cret", "friend": 2, "friends": [2, 99, 3]}),
                json!({"id": 2, "name": "Bob", "password": "hunter2", "friend": 1}),
                json!({"id": 3, "name": "Cid", "password": "pw"}),
            ],
        )
        .with(
            "posts",
            posts_schema(),
            vec![
                json!({"id": 1, "title": "Hello", "author": 1, "editor": 2, "tags": ["a", "b"], "meta": {"views": 3, "draft": false}}),
                json!({"id": 2, "title": "Again", "author": 2, "editor": 2}),
                json!({"id": 3, "title": "Orphan", "author": 99}),
            ],
        )
        .with(
            "comments",
            comments_schema(),
            vec![
                json!({"id": 10, "post": 1, "body": "first", "rank": 3}),
                json!({"id": 11, "post": 1, "body": "second", "rank": 1}),
                json!({"id": 12, "post": 1, "body": "third", "rank": 2}),
                json!({"id": 13, "post": 2, "body": "other", "rank": 1}),
            ],
        )
}

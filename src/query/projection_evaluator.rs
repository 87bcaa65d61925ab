//! # Projection Evaluation
//!
//! Evaluation runs in two phases:
//!
//! 1. A synchronous walk of the projection over the document builds an
//!    output tree. Fields living in other resources get an empty slot and a
//!    pending request whose continuation fills the slot.
//! 2. The batch resolver executes pending requests pass after pass. The
//!    tree is rendered to a document once every slot is settled.
//!
//! Field handlers and serializers of containers run at render time, on the
//! settled value.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::predicate::{Expression, Predicate};
use super::projection::{Projection, ProjectionField};
use super::resolver::{Continuation, ReferenceBatchResolver, ReferenceResolver, Resolved};
use super::sort::Sort;
use super::value::{values_equal, Document};
use super::window::Window;
use super::Query;
use crate::config::EngineConfig;
use crate::observability::{log_event, Event, Logger};
use crate::schema::{Connection, Field, FieldGetter, FieldHandler, FieldKind, Params, Validator};

/// Output tree under construction
enum Node {
    Value(Value),
    Doc(Vec<(String, Node)>),
    List(Vec<Node>),
    /// Filled by a continuation during resolution
    Slot(Slot),
    /// Handler and serializer applied once the inner node is rendered
    Transformed(Box<Node>, Arc<Transform>),
}

type Slot = Arc<Mutex<Node>>;

fn new_slot(initial: Node) -> Slot {
    Arc::new(Mutex::new(initial))
}

fn fill(slot: &Slot, node: Node) -> QueryResult<()> {
    let mut guard = slot
        .lock()
        .map_err(|_| QueryError::Internal("lock poisoned".to_string()))?;
    *guard = node;
    Ok(())
}

/// Set `key`, replacing a previous entry with the same key in place
fn set(doc: &mut Vec<(String, Node)>, key: String, node: Node) {
    match doc.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = node,
        None => doc.push((key, node)),
    }
}

impl Node {
    fn render(self) -> QueryResult<Value> {
        match self {
            Node::Value(value) => Ok(value),
            Node::Doc(entries) => render_doc(entries).map(Value::Object),
            Node::List(items) => items
                .into_iter()
                .map(Node::render)
                .collect::<QueryResult<Vec<_>>>()
                .map(Value::Array),
            Node::Slot(slot) => {
                let node = {
                    let mut guard = slot
                        .lock()
                        .map_err(|_| QueryError::Internal("lock poisoned".to_string()))?;
                    std::mem::replace(&mut *guard, Node::Value(Value::Null))
                };
                node.render()
            }
            Node::Transformed(inner, transform) => transform.apply(inner.render()?),
        }
    }
}

fn render_doc(entries: Vec<(String, Node)>) -> QueryResult<Document> {
    let mut doc = Document::new();
    for (key, node) in entries {
        doc.insert(key, node.render()?);
    }
    Ok(doc)
}

/// Handler and serializer of a field, with the params of its projection
struct Transform {
    name: String,
    handler: Option<FieldHandler>,
    params: Params,
    serializer: Option<Arc<dyn Validator>>,
}

impl Transform {
    fn new(pf: &ProjectionField, def: Option<&Field>) -> Arc<Self> {
        Arc::new(Self {
            name: pf.name.clone(),
            handler: def.and_then(|d| d.handler.clone()),
            params: pf.params.clone(),
            serializer: def.and_then(|d| d.validator.clone()),
        })
    }

    /// The handler only runs when the projection passes params
    fn apply(&self, value: Value) -> QueryResult<Value> {
        let mut value = value;
        if let Some(handler) = &self.handler {
            if !self.params.is_empty() {
                value = handler(&value, &self.params)
                    .map_err(|e| QueryError::evaluation(format!("{}: {}", self.name, e)))?;
            }
        }
        if let Some(serializer) = &self.serializer {
            value = serializer
                .serialize(value)
                .map_err(|e| QueryError::evaluation(format!("{}: {}", self.name, e)))?;
        }
        Ok(value)
    }
}

/// Expand the empty projection and `*` against the document keys
fn prepare_projection(projection: &Projection, doc: &Document) -> QueryResult<Vec<ProjectionField>> {
    if projection.is_empty() {
        return Ok(doc.keys().map(ProjectionField::new).collect());
    }
    if projection.iter().filter(|pf| pf.is_wildcard()).count() > 1 {
        return Err(QueryError::evaluation("only one * in projection allowed"));
    }
    let mut fields = Vec::with_capacity(projection.0.len());
    for pf in projection.iter() {
        if !pf.is_wildcard() {
            fields.push(pf.clone());
            continue;
        }
        for key in doc.keys() {
            let explicit = projection
                .iter()
                .any(|other| other.name == *key && other.alias.is_none());
            if !explicit {
                fields.push(ProjectionField {
                    name: key.clone(),
                    children: pf.children.clone(),
                    ..ProjectionField::default()
                });
            }
        }
    }
    Ok(fields)
}

/// State shared by the synchronous walk and the continuations
#[derive(Clone)]
struct Evaluation {
    batch: Arc<ReferenceBatchResolver>,
    connection_limit: i64,
}

impl Evaluation {
    fn eval_projection(
        &self,
        projection: &Projection,
        doc: &Document,
        fields: &dyn FieldGetter,
    ) -> QueryResult<Vec<(String, Node)>> {
        let mut out = Vec::new();
        for pf in prepare_projection(projection, doc)? {
            let def = fields.get_field(&pf.name);
            if def.map_or(false, |d| d.hidden) {
                continue;
            }
            let key = pf.output_name().to_string();
            if let Some(def) = def {
                if let FieldKind::Connection(conn) = &def.kind {
                    let node = self.eval_connection(&pf, def, conn, doc)?;
                    set(&mut out, key, node);
                    continue;
                }
            }
            if let Some(value) = doc.get(&pf.name) {
                let node = self.eval_value(&pf, def, value)?;
                set(&mut out, key, node);
            }
        }
        Ok(out)
    }

    fn eval_value(&self, pf: &ProjectionField, def: Option<&Field>, value: &Value) -> QueryResult<Node> {
        match (&pf.children, def) {
            (Some(children), Some(def)) if !value.is_null() => {
                self.eval_children(pf, children, def, value)
            }
            (Some(_), None) if !value.is_null() => Err(no_children(pf)),
            _ => Transform::new(pf, def).apply(value.clone()).map(Node::Value),
        }
    }

    fn eval_children(
        &self,
        pf: &ProjectionField,
        children: &Projection,
        def: &Field,
        value: &Value,
    ) -> QueryResult<Node> {
        let transform = Transform::new(pf, Some(def));
        match &def.kind {
            FieldKind::Object(schema) => {
                let sub = value.as_object().ok_or_else(|| not_a_dict(pf))?;
                let doc = self
                    .eval_projection(children, sub, schema.as_ref())
                    .map_err(|e| e.within(&pf.name))?;
                Ok(Node::Transformed(Box::new(Node::Doc(doc)), transform))
            }
            FieldKind::Reference(reference) => {
                let slot = new_slot(Node::Value(Value::Null));
                let query = Query {
                    projection: children.clone(),
                    predicate: Predicate(vec![Expression::equal("id", value.clone())]),
                    ..Query::default()
                };
                let then = self.continue_reference(pf, children.clone(), slot.clone(), transform);
                self.batch.request(&reference.path, query, then)?;
                Ok(Node::Slot(slot))
            }
            FieldKind::Array(element) => {
                let items = value.as_array().ok_or_else(|| {
                    QueryError::evaluation(format!("{}: invalid value: not an array", pf.name))
                })?;
                let list = self.eval_array(pf, children, element, items)?;
                Ok(Node::Transformed(Box::new(list), transform))
            }
            FieldKind::Scalar | FieldKind::Connection(_) => Err(no_children(pf)),
        }
    }

    /// Evaluate the items of a list field described by `element`
    fn eval_array(
        &self,
        pf: &ProjectionField,
        children: &Projection,
        element: &Field,
        items: &[Value],
    ) -> QueryResult<Node> {
        let transform = Transform::new(pf, Some(element));
        match &element.kind {
            FieldKind::Object(schema) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    let sub = item.as_object().ok_or_else(|| not_a_dict(pf))?;
                    let doc = self
                        .eval_projection(children, sub, schema.as_ref())
                        .map_err(|e| e.within(&pf.name))?;
                    nodes.push(Node::Transformed(Box::new(Node::Doc(doc)), transform.clone()));
                }
                Ok(Node::List(nodes))
            }
            FieldKind::Reference(reference) => {
                let ids: Vec<Value> = items.iter().filter(|id| !id.is_null()).cloned().collect();
                if ids.is_empty() {
                    return Ok(Node::List(Vec::new()));
                }
                let slot = new_slot(Node::List(Vec::new()));
                let query = Query {
                    projection: children.clone(),
                    predicate: Predicate(vec![Expression::in_list("id", ids.clone())]),
                    ..Query::default()
                };
                let evaluation = self.clone();
                let name = pf.name.clone();
                let children = children.clone();
                let target = slot.clone();
                let then: Continuation = Box::new(move |resolved: Resolved| {
                    let mut nodes = Vec::with_capacity(ids.len());
                    for id in &ids {
                        let found = resolved
                            .items
                            .iter()
                            .find(|item| item.get("id").map_or(false, |v| values_equal(v, id)));
                        if let Some(item) = found {
                            let doc = evaluation
                                .eval_projection(&children, item, resolved.fields.as_ref())
                                .map_err(|e| e.within(&name))?;
                            nodes.push(Node::Transformed(Box::new(Node::Doc(doc)), transform.clone()));
                        }
                    }
                    fill(&target, Node::List(nodes))
                });
                self.batch.request(&reference.path, query, then)?;
                Ok(Node::Slot(slot))
            }
            FieldKind::Array(inner) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    let sub = item.as_array().ok_or_else(|| {
                        QueryError::evaluation(format!("{}: invalid value: not an array", pf.name))
                    })?;
                    let list = self.eval_array(pf, children, inner, sub)?;
                    nodes.push(Node::Transformed(Box::new(list), transform.clone()));
                }
                Ok(Node::List(nodes))
            }
            FieldKind::Scalar | FieldKind::Connection(_) => Err(no_children(pf)),
        }
    }

    /// Continuation of a single reference: evaluate the children on the
    /// target document, leave null when it was not found
    fn continue_reference(
        &self,
        pf: &ProjectionField,
        children: Projection,
        slot: Slot,
        transform: Arc<Transform>,
    ) -> Continuation {
        let evaluation = self.clone();
        let name = pf.name.clone();
        Box::new(move |resolved: Resolved| {
            let Some(item) = resolved.items.first() else {
                return Ok(());
            };
            let doc = evaluation
                .eval_projection(&children, item, resolved.fields.as_ref())
                .map_err(|e| e.within(&name))?;
            fill(&slot, Node::Transformed(Box::new(Node::Doc(doc)), transform))
        })
    }

    fn eval_connection(
        &self,
        pf: &ProjectionField,
        def: &Field,
        conn: &Connection,
        doc: &Document,
    ) -> QueryResult<Node> {
        let id = doc.get("id").ok_or_else(|| {
            QueryError::evaluation(format!(
                "{}: error applying projection on sub-resource: item lacks ID field",
                pf.name
            ))
        })?;
        let query = self.connection_query(pf, conn, id)?;
        let children = query.projection.clone();
        let slot = new_slot(Node::List(Vec::new()));
        let transform = Transform::new(pf, Some(def));
        let evaluation = self.clone();
        let name = pf.name.clone();
        let target = slot.clone();
        let then: Continuation = Box::new(move |resolved: Resolved| {
            let mut nodes = Vec::with_capacity(resolved.items.len());
            for item in &resolved.items {
                let doc = evaluation
                    .eval_projection(&children, item, resolved.fields.as_ref())
                    .map_err(|e| e.within(&name))?;
                nodes.push(Node::Doc(doc));
            }
            fill(&target, Node::Transformed(Box::new(Node::List(nodes)), transform))
        });
        self.batch.request(&conn.path, query, then)?;
        Ok(Node::Slot(slot))
    }

    /// Query of the items of a connection pointing at `id`, narrowed by the
    /// `filter`, `sort`, `page`, `limit` and `skip` params
    fn connection_query(&self, pf: &ProjectionField, conn: &Connection, id: &Value) -> QueryResult<Query> {
        let mut predicate = Predicate(vec![Expression::equal(conn.field.clone(), id.clone())]);
        if let Some(filter) = pf.params.get("filter").and_then(Value::as_str) {
            let invalid = |e: QueryError| {
                QueryError::evaluation(format!("{}: invalid filter: {}", pf.name, e))
            };
            let mut extra = Predicate::parse(filter).map_err(invalid)?;
            extra.validate(conn.schema.as_ref()).map_err(invalid)?;
            predicate.0.extend(extra.0);
        }
        let sort = match pf.params.get("sort").and_then(Value::as_str) {
            Some(sort) => Sort::parse(sort).map_err(|e| {
                QueryError::evaluation(format!("{}: invalid sort: {}", pf.name, e))
            })?,
            None => Sort::default(),
        };
        let int_param = |name: &str, default: i64| {
            pf.params
                .get(name)
                .and_then(Value::as_f64)
                .map_or(default, |n| n as i64)
        };
        Ok(Query {
            projection: pf.children.clone().unwrap_or_default(),
            predicate,
            sort,
            window: Window::page(
                int_param("page", 1),
                int_param("limit", self.connection_limit),
                int_param("skip", 0),
            ),
        })
    }
}

fn no_children(pf: &ProjectionField) -> QueryError {
    QueryError::evaluation(format!("{}: field has no children", pf.name))
}

fn not_a_dict(pf: &ProjectionField) -> QueryError {
    QueryError::evaluation(format!("{}: invalid value: not a dict", pf.name))
}

/// Applies projections on documents, resolving references through a
/// [`ReferenceResolver`]
#[derive(Clone)]
pub struct ProjectionEvaluator {
    resolver: Arc<dyn ReferenceResolver>,
    logger: Logger,
    /// Set by `with_logger`, keeps `with_config` from replacing the logger
    custom_logger: bool,
    config: EngineConfig,
}

impl ProjectionEvaluator {
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            resolver,
            logger: Logger::discard(),
            custom_logger: false,
            config: EngineConfig::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self.custom_logger = true;
        self
    }

    /// Apply `config`. Unless a logger was given with `with_logger`, events
    /// go to stderr at the configured level.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        if !self.custom_logger {
            self.logger = config.logger();
        }
        self.config = config;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate `projection` on `doc`, whose fields are described by
    /// `fields`. References are resolved before returning.
    pub async fn eval(
        &self,
        projection: &Projection,
        doc: &Document,
        fields: &dyn FieldGetter,
    ) -> QueryResult<Document> {
        let evaluation = Evaluation {
            batch: Arc::new(ReferenceBatchResolver::new(self.config.coalesce_references)),
            connection_limit: self.config.connection_limit,
        };
        let tree = evaluation.eval_projection(projection, doc, fields)?;
        let passes = evaluation
            .batch
            .execute(self.resolver.clone(), &self.logger)
            .await?;
        let result = render_doc(tree)?;

        let passes = passes.to_string();
        let count = result.len().to_string();
        log_event(
            &self.logger,
            Event::EvalComplete,
            &[("fields", &count), ("passes", &passes)],
        );
        Ok(result)
    }

    /// Evaluate `projection` on each document, sharing resolution passes
    /// between all of them
    pub async fn eval_all(
        &self,
        projection: &Projection,
        docs: &[Document],
        fields: &dyn FieldGetter,
    ) -> QueryResult<Vec<Document>> {
        let evaluation = Evaluation {
            batch: Arc::new(ReferenceBatchResolver::new(self.config.coalesce_references)),
            connection_limit: self.config.connection_limit,
        };
        let mut trees = Vec::with_capacity(docs.len());
        for doc in docs {
            trees.push(evaluation.eval_projection(projection, doc, fields)?);
        }
        let passes = evaluation
            .batch
            .execute(self.resolver.clone(), &self.logger)
            .await?;
        let results = trees
            .into_iter()
            .map(render_doc)
            .collect::<QueryResult<Vec<_>>>()?;

        let passes = passes.to_string();
        let count = results.len().to_string();
        log_event(
            &self.logger,
            Event::EvalComplete,
            &[("items", &count), ("passes", &passes)],
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;
    use crate::schema::testing::{IntegerType, StringType};
    use crate::schema::{Param, Schema};
    use futures_util::future::BoxFuture;
    use serde_json::json;

    /// Resolver failing every lookup, for trees without references
    struct NoResolver;

    impl ReferenceResolver for NoResolver {
        fn resolve<'a>(&'a self, path: &'a str, _query: &'a Query) -> BoxFuture<'a, QueryResult<Resolved>> {
            Box::pin(async move { Err(QueryError::Internal(format!("unexpected lookup on {}", path))) })
        }
    }

    struct Upper;

    impl Validator for Upper {
        fn validate(&self, value: &Value) -> Result<Value, String> {
            Ok(value.clone())
        }

        fn serialize(&self, value: Value) -> Result<Value, String> {
            match value {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Ok(other),
            }
        }
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Schema {
        Schema::new()
            .field("id", Field::new())
            .field("name", Field::new().with_validator(StringType))
            .field("age", Field::new().with_validator(IntegerType))
            .field("password", Field::new().hidden())
            .field("shout", Field::new().with_validator(Upper))
            .field(
                "title",
                Field::new()
                    .with_param("max", Param::with_validator(IntegerType))
                    .with_handler(|value, params| {
                        let max = params["max"].as_f64().ok_or("bad max")? as usize;
                        let s = value.as_str().ok_or("not a string")?;
                        Ok(Value::String(s.chars().take(max).collect()))
                    }),
            )
            .field(
                "parent",
                Field::object(Schema::new().field("child", Field::new()).field("other", Field::new())),
            )
            .field(
                "items",
                Field::array(Field::object(Schema::new().field("k", Field::new()).field("v", Field::new()))),
            )
    }

    async fn eval(projection: &str, value: Value) -> QueryResult<Document> {
        let projection = Projection::parse(projection)?;
        ProjectionEvaluator::new(Arc::new(NoResolver))
            .eval(&projection, &doc(value), &schema())
            .await
    }

    #[tokio::test]
    async fn test_empty_projection_selects_all() {
        let result = eval("", json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(Value::Object(result), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_sub_document_projection() {
        let result = eval("parent{child}", json!({"parent": {"child": "v", "other": "x"}, "other": "w"}))
            .await
            .unwrap();
        assert_eq!(Value::Object(result), json!({"parent": {"child": "v"}}));
    }

    #[tokio::test]
    async fn test_empty_children_embed_everything() {
        let result = eval("parent{}", json!({"parent": {"child": "v", "other": "x"}}))
            .await
            .unwrap();
        assert_eq!(Value::Object(result), json!({"parent": {"child": "v", "other": "x"}}));
    }

    #[tokio::test]
    async fn test_alias_and_missing_fields() {
        let result = eval("n:name,age,nope", json!({"name": "ann", "age": 3})).await.unwrap();
        assert_eq!(Value::Object(result), json!({"n": "ann", "age": 3}));
    }

    #[tokio::test]
    async fn test_hidden_fields_skipped() {
        let result = eval("", json!({"name": "ann", "password": "secret"})).await.unwrap();
        assert_eq!(Value::Object(result), json!({"name": "ann"}));
    }

    #[tokio::test]
    async fn test_wildcard() {
        let result = eval("n:name,*", json!({"name": "ann", "age": 3})).await.unwrap();
        assert_eq!(Value::Object(result), json!({"n": "ann", "name": "ann", "age": 3}));

        let err = eval("*,*", json!({"a": 1})).await.unwrap_err();
        assert_eq!(err.to_string(), "only one * in projection allowed");
    }

    #[tokio::test]
    async fn test_handler_and_serializer() {
        let result = eval("title(max:3),t:title,shout", json!({"title": "abcdef", "shout": "hey"}))
            .await
            .unwrap();
        assert_eq!(Value::Object(result), json!({"title": "abc", "t": "abcdef", "shout": "HEY"}));
    }

    #[tokio::test]
    async fn test_handler_error_is_field_annotated() {
        let projection = Projection(vec![ProjectionField::new("title").with_param("max", json!("x"))]);
        let err = ProjectionEvaluator::new(Arc::new(NoResolver))
            .eval(&projection, &doc(json!({"title": "abc"})), &schema())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "title: bad max");
    }

    #[tokio::test]
    async fn test_array_of_documents() {
        let result = eval("items{k}", json!({"items": [{"k": 1, "v": 2}, {"k": 3, "v": 4}]}))
            .await
            .unwrap();
        assert_eq!(Value::Object(result), json!({"items": [{"k": 1}, {"k": 3}]}));
    }

    #[tokio::test]
    async fn test_invalid_shapes() {
        let err = eval("parent{child}", json!({"parent": "flat"})).await.unwrap_err();
        assert_eq!(err.to_string(), "parent: invalid value: not a dict");

        let err = eval("items{k}", json!({"items": {"k": 1}})).await.unwrap_err();
        assert_eq!(err.to_string(), "items: invalid value: not an array");

        let err = eval("name{x}", json!({"name": "ann"})).await.unwrap_err();
        assert_eq!(err.to_string(), "name: field has no children");
    }

    #[tokio::test]
    async fn test_null_with_children_is_kept() {
        let result = eval("parent{child}", json!({"parent": null})).await.unwrap();
        assert_eq!(Value::Object(result), json!({"parent": null}));
    }

    #[tokio::test]
    async fn test_eval_logs_completion() {
        let (logger, buffer) = Logger::memory(Severity::Info);
        let projection = Projection::parse("name").unwrap();
        ProjectionEvaluator::new(Arc::new(NoResolver))
            .with_logger(logger)
            .eval(&projection, &doc(json!({"name": "ann"})), &schema())
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&buffer.contents()).unwrap();
        assert_eq!(parsed["event"], "QUERY_EVAL_COMPLETE");
        assert_eq!(parsed["fields"], "1");
        assert_eq!(parsed["passes"], "0");
    }

    #[test]
    fn test_config_sets_log_level() {
        let config = EngineConfig {
            log_level: Severity::Error,
            ..EngineConfig::default()
        };
        let evaluator = ProjectionEvaluator::new(Arc::new(NoResolver)).with_config(config.clone());
        assert_eq!(evaluator.logger().min_severity(), Severity::Error);
        assert!(evaluator.logger().enabled(Severity::Error));
        assert!(!evaluator.logger().enabled(Severity::Info));

        let (logger, _buffer) = Logger::memory(Severity::Trace);
        let evaluator = ProjectionEvaluator::new(Arc::new(NoResolver))
            .with_logger(logger)
            .with_config(config);
        assert_eq!(evaluator.logger().min_severity(), Severity::Trace);
        assert_eq!(evaluator.config().log_level, Severity::Error);
    }
}

//! Field capability definitions
//!
//! A [`Field`] describes what a query may do with a document field: filter
//! on it, sort on it, select it, pass it params, or follow it to another
//! resource. A [`Schema`] is the stock [`FieldGetter`] built from fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::validator::{FieldHandler, Param, Params, Validator};
use serde_json::Value;

/// Resolves field capabilities by name.
///
/// Names may use dotted notation (`field.subfield`) to reach fields of
/// sub-schemas.
pub trait FieldGetter: Send + Sync {
    fn get_field(&self, name: &str) -> Option<&Field>;
}

/// Link to a single document of another resource, stored as its id
#[derive(Clone)]
pub struct Reference {
    /// Path of the target resource
    pub path: String,
    /// Field capabilities of the target resource
    pub schema: Arc<dyn FieldGetter>,
}

/// Implicit collection of another resource's documents whose `field` holds
/// the id of the current document. Never stored in the document itself.
#[derive(Clone)]
pub struct Connection {
    /// Path of the target resource
    pub path: String,
    /// Field of the target resource pointing back to the current document
    pub field: String,
    /// Field capabilities of the target resource
    pub schema: Arc<dyn FieldGetter>,
}

/// Structural kind of a field
#[derive(Clone, Default)]
pub enum FieldKind {
    /// Plain value
    #[default]
    Scalar,
    /// Nested document with its own fields
    Object(Arc<dyn FieldGetter>),
    /// List whose elements are described by the boxed field
    Array(Box<Field>),
    Reference(Reference),
    Connection(Connection),
}

impl FieldKind {
    /// Kind name shown by `Debug`
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Object(_) => "object",
            FieldKind::Array(_) => "array",
            FieldKind::Reference(_) => "reference",
            FieldKind::Connection(_) => "connection",
        }
    }
}

/// Capabilities of a single field
#[derive(Clone, Default)]
pub struct Field {
    /// Field may be used in predicates
    pub filterable: bool,
    /// Field may be used in sorts
    pub sortable: bool,
    /// Field is stored but never shown nor selectable
    pub hidden: bool,
    /// Type validator
    pub validator: Option<Arc<dyn Validator>>,
    /// Params accepted in projections, by name
    pub params: BTreeMap<String, Param>,
    /// Transform called when the projection passes params
    pub handler: Option<FieldHandler>,
    pub kind: FieldKind,
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, param: Param) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value, &Params) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Create a sub-document field
    pub fn object(schema: impl FieldGetter + 'static) -> Self {
        Self {
            kind: FieldKind::Object(Arc::new(schema)),
            ..Self::default()
        }
    }

    /// Create a list field with the given element definition
    pub fn array(values: Field) -> Self {
        Self {
            kind: FieldKind::Array(Box::new(values)),
            ..Self::default()
        }
    }

    /// Create a reference field to the resource at `path`
    pub fn reference(path: impl Into<String>, schema: Arc<dyn FieldGetter>) -> Self {
        Self {
            kind: FieldKind::Reference(Reference {
                path: path.into(),
                schema,
            }),
            ..Self::default()
        }
    }

    /// Create a connection field to the resource at `path` joined on `field`
    pub fn connection(
        path: impl Into<String>,
        field: impl Into<String>,
        schema: Arc<dyn FieldGetter>,
    ) -> Self {
        Self {
            kind: FieldKind::Connection(Connection {
                path: path.into(),
                field: field.into(),
                schema,
            }),
            ..Self::default()
        }
    }

    /// Whether the validator accepts comparison operators
    pub fn is_numeric(&self) -> bool {
        self.validator.as_ref().map_or(false, |v| v.is_numeric())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("filterable", &self.filterable)
            .field("sortable", &self.sortable)
            .field("hidden", &self.hidden)
            .field("validator", &self.validator.is_some())
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("handler", &self.handler.is_some())
            .field("kind", &self.kind.kind_name())
            .finish()
    }
}

/// A set of named fields
#[derive(Clone, Default)]
pub struct Schema {
    pub fields: BTreeMap<String, Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn into_shared(self) -> Arc<dyn FieldGetter> {
        Arc::new(self)
    }
}

impl FieldGetter for Schema {
    fn get_field(&self, name: &str) -> Option<&Field> {
        match name.split_once('.') {
            None => self.fields.get(name),
            Some((head, rest)) => match &self.fields.get(head)?.kind {
                FieldKind::Object(sub) => sub.get_field(rest),
                _ => None,
            },
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

//! Field capability contract consumed by the query engine
//!
//! # Design Principles
//!
//! - The engine never knows concrete field types, only capabilities
//! - Capabilities are immutable and shared (`Arc`) across evaluation tasks
//! - Dotted names reach into sub-schemas

mod types;
mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use types::{Connection, Field, FieldGetter, FieldKind, Reference, Schema};
pub use validator::{FieldHandler, LessFunc, Param, Params, Validator};

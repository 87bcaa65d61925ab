//! # Query Errors
//!
//! Error types for the query engine.
//!
//! Error codes:
//! - AERO_QUERY_SYNTAX (parser failure with byte offset)
//! - AERO_QUERY_INVALID (parse failure without position)
//! - AERO_QUERY_VALIDATION (query does not fit the schema)
//! - AERO_QUERY_EVALUATION (projection could not be applied)
//! - AERO_QUERY_RESOLVER (error returned by a reference resolver)
//! - AERO_QUERY_INTERNAL

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query engine errors
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    // ==================
    // Parse Errors
    // ==================
    /// Syntax error at a byte offset of the parsed text
    #[error("char {pos}: {message}")]
    Syntax { pos: usize, message: String },

    /// Parse error with no meaningful position (sort list, JSON predicate)
    #[error("{0}")]
    Parse(String),

    // ==================
    // Schema Errors
    // ==================
    /// Query does not fit the field capabilities it is validated against
    #[error("{0}")]
    Validation(String),

    /// Projection could not be applied on a document
    #[error("{0}")]
    Evaluation(String),

    // ==================
    // External Errors
    // ==================
    /// Error returned by a reference resolver, displayed verbatim
    #[error("{0}")]
    Resolver(Arc<dyn StdError + Send + Sync>),

    /// Internal failure (poisoned lock, aborted task)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn syntax(pos: usize, message: impl Into<String>) -> Self {
        QueryError::Syntax {
            pos,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        QueryError::Parse(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        QueryError::Evaluation(message.into())
    }

    /// Wrap an opaque resolver error
    pub fn resolver<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        QueryError::Resolver(Arc::new(err))
    }

    /// Nest the error under a parent field (`parent.child: ...`).
    ///
    /// Only validation and evaluation errors carry a field path; other kinds
    /// are returned unchanged.
    pub fn within(self, parent: &str) -> Self {
        match self {
            QueryError::Validation(msg) => QueryError::Validation(format!("{}.{}", parent, msg)),
            QueryError::Evaluation(msg) => QueryError::Evaluation(format!("{}.{}", parent, msg)),
            other => other,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Syntax { .. } => "AERO_QUERY_SYNTAX",
            QueryError::Parse(_) => "AERO_QUERY_INVALID",
            QueryError::Validation(_) => "AERO_QUERY_VALIDATION",
            QueryError::Evaluation(_) => "AERO_QUERY_EVALUATION",
            QueryError::Resolver(_) => "AERO_QUERY_RESOLVER",
            QueryError::Internal(_) => "AERO_QUERY_INTERNAL",
        }
    }

    /// Whether the error was caused by the client's query text or shape
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::Syntax { .. } | QueryError::Parse(_) | QueryError::Validation(_)
        )
    }
}

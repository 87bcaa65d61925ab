//! Observability for the query engine
//!
//! Structured JSON logging through an explicit [`Logger`] handle.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on evaluation
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use aeroquery::observability::{log_event, Event, Logger, Severity};
//!
//! let logger = Logger::stderr(Severity::Info);
//! log_event(&logger, Event::EvalComplete, &[("fields", "3")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{LogBuffer, Logger, Severity};

/// Log a typed event at its own severity
pub fn log_event(logger: &Logger, event: Event, fields: &[(&str, &str)]) {
    logger.log(event.severity(), event.as_str(), fields);
}

//! Observable query engine events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events of projection evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A resolution pass executed all its pending requests
    ResolutionPass,
    /// A resolution pass ended with an error
    ResolutionFailed,
    /// A projection evaluation completed
    EvalComplete,
}

impl Event {
    /// Returns the event name as logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ResolutionPass => "QUERY_RESOLUTION_PASS",
            Event::ResolutionFailed => "QUERY_RESOLUTION_FAILED",
            Event::EvalComplete => "QUERY_EVAL_COMPLETE",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ResolutionPass => Severity::Trace,
            Event::ResolutionFailed => Severity::Error,
            Event::EvalComplete => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

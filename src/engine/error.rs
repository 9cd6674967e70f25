//! Engine Error Taxonomy
//!
//! Two families with different propagation rules:
//!
//! - [`ActionError`]: anything that goes wrong while invoking an
//!   action. Caught by the executor, recorded in the run's log, and
//!   contained — the run ends with outcome `Errored` and the caller of
//!   `execute_run` sees `Ok`.
//! - [`EngineError`]: caller-usage errors (malformed resume state,
//!   inactive flow, unknown records). These fail loudly and propagate.

use serde_json::Value;
use thiserror::Error;

use crate::eval::EvaluationError;
use crate::flow::FlowId;

/// A failure raised while invoking an action; terminates only the
/// current run.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action {0} is missing or not found")]
    Missing(String),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Expected a directive value, got {0}")]
    BadDirective(String),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// A registry lookup failure for the named action type.
    pub fn missing(name: impl Into<String>) -> Self {
        ActionError::Missing(name.into())
    }

    /// A generic action failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }

    /// A directive-type failure for a config value that decodes to no
    /// directive.
    pub fn bad_directive(value: &Value) -> Self {
        ActionError::BadDirective(value.to_string())
    }

    /// Stable tag identifying the error kind in run logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Missing(_) => "ActionMissingError",
            ActionError::Evaluation(_) => "EvaluationError",
            ActionError::BadDirective(_) => "DirectiveTypeError",
            ActionError::Failed(_) => "ActionError",
        }
    }

    /// One log line: kind plus message.
    pub fn log_line(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// A caller-usage error; propagates to the caller unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Cannot start a flow run for an inactive flow")]
    InactiveFlow,

    #[error("Flow run is waiting but has no continue_after time set")]
    WaitingWithoutDeadline,

    #[error("Flow run is waiting but has no action set")]
    WaitingWithoutNode,

    #[error("unknown flow {0}")]
    UnknownFlow(FlowId),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

//! Validation faults raised synchronously to callers.
//!
//! These are API-misuse errors: an operation that returns one of them has not
//! mutated any state. Business-level failures (an activity that could not be
//! scheduled, an unknown timer id) are never errors; they are recorded in the
//! execution history with a [`FailureCause`](crate::history::FailureCause).

use thiserror::Error;

use crate::types::TypeKey;

/// Core error type for the workflow engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwfError {
    /// A domain, execution or other named resource does not exist.
    #[error("Unknown {kind}: {name}")]
    UnknownResource { kind: &'static str, name: String },

    /// A workflow or activity type is not registered in the domain.
    #[error("Unknown {kind}: {key}")]
    UnknownType { kind: &'static str, key: TypeKey },

    #[error("{kind} already exists: {key}")]
    TypeAlreadyExists { kind: &'static str, key: TypeKey },

    #[error("{kind} is deprecated: {key}")]
    TypeDeprecated { kind: &'static str, key: TypeKey },

    #[error("Domain already exists: {0}")]
    DomainAlreadyExists(String),

    #[error("Domain is deprecated: {0}")]
    DomainDeprecated(String),

    /// No explicit value and no type default for a required attribute.
    #[error("No default value for attribute: {attribute}")]
    DefaultUndefined { attribute: &'static str },

    /// Malformed request, unknown task token or task in the wrong state.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow execution is closed: WorkflowExecution(workflow_id: {workflow_id}, run_id: {run_id})")]
    ClosedExecution { workflow_id: String, run_id: String },

    #[error("Workflow execution already started: {workflow_id}")]
    WorkflowExecutionAlreadyStarted { workflow_id: String },

    /// A decision that cannot be interpreted or is structurally invalid.
    #[error("Bad decision: {0}")]
    BadDecision(String),
}

/// Result type alias for engine operations.
pub type SwfResult<T> = Result<T, SwfError>;

impl SwfError {
    /// Fault name as reported by the managed service, for the translation layer.
    #[must_use]
    pub fn fault_type(&self) -> &'static str {
        match self {
            Self::UnknownResource { .. } | Self::UnknownType { .. } => "UnknownResourceFault",
            Self::TypeAlreadyExists { .. } => "TypeAlreadyExistsFault",
            Self::TypeDeprecated { .. } => "TypeDeprecatedFault",
            Self::DomainAlreadyExists(_) => "DomainAlreadyExistsFault",
            Self::DomainDeprecated(_) => "DomainDeprecatedFault",
            Self::DefaultUndefined { .. } => "DefaultUndefinedFault",
            Self::Validation(_) => "ValidationException",
            Self::ClosedExecution { .. } => "ClosedExecutionFault",
            Self::WorkflowExecutionAlreadyStarted { .. } => "WorkflowExecutionAlreadyStartedFault",
            Self::BadDecision(_) => "DecisionValidationException",
        }
    }

    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownResource {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

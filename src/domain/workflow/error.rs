//! Workflow error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DomainError;

/// Errors raised while resolving, evaluating or executing a workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid variable reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Node '{0}' has not been executed yet")]
    NodeNotExecuted(String),

    #[error("Index out of range in '{reference}': {message}")]
    IndexOutOfRange { reference: String, message: String },

    #[error("Property '{property}' not found in '{reference}'")]
    PropertyNotFound { reference: String, property: String },

    #[error("No runtime registered for node type '{0}'")]
    UnsupportedNodeType(String),

    #[error("Cycle detected: node '{0}' was revisited")]
    CycleDetected(String),

    #[error("External call to {collaborator} failed: {message}")]
    ExternalCallFailure { collaborator: String, message: String },

    #[error("Invalid workflow definition: {0}")]
    DefinitionInvalid(String),

    #[error("Cannot convert {value} to {target}")]
    TypeConversion { value: String, target: String },

    #[error("Node runtime panicked: {0}")]
    NodePanicked(String),

    #[error("Execution cancelled")]
    Cancelled,
}

/// Serializable error kind carried by failure events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowErrorKind {
    InvalidReference,
    NodeNotExecuted,
    IndexOutOfRange,
    PropertyNotFound,
    UnsupportedNodeType,
    CycleDetected,
    ExternalCallFailure,
    DefinitionInvalid,
    TypeConversion,
    NodePanicked,
    Cancelled,
}

impl WorkflowError {
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn node_not_executed(node_key: impl Into<String>) -> Self {
        Self::NodeNotExecuted(node_key.into())
    }

    pub fn index_out_of_range(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexOutOfRange {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn property_not_found(reference: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            reference: reference.into(),
            property: property.into(),
        }
    }

    pub fn unsupported_node_type(node_type: impl std::fmt::Display) -> Self {
        Self::UnsupportedNodeType(node_type.to_string())
    }

    pub fn cycle_detected(node_key: impl Into<String>) -> Self {
        Self::CycleDetected(node_key.into())
    }

    pub fn external_call(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCallFailure {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn definition_invalid(message: impl Into<String>) -> Self {
        Self::DefinitionInvalid(message.into())
    }

    pub fn type_conversion(value: impl std::fmt::Display, target: impl std::fmt::Display) -> Self {
        Self::TypeConversion {
            value: value.to_string(),
            target: target.to_string(),
        }
    }

    pub fn node_panicked(message: impl Into<String>) -> Self {
        Self::NodePanicked(message.into())
    }

    /// Kind of this error, as reported in failure events
    pub fn kind(&self) -> WorkflowErrorKind {
        match self {
            Self::InvalidReference { .. } => WorkflowErrorKind::InvalidReference,
            Self::NodeNotExecuted(_) => WorkflowErrorKind::NodeNotExecuted,
            Self::IndexOutOfRange { .. } => WorkflowErrorKind::IndexOutOfRange,
            Self::PropertyNotFound { .. } => WorkflowErrorKind::PropertyNotFound,
            Self::UnsupportedNodeType(_) => WorkflowErrorKind::UnsupportedNodeType,
            Self::CycleDetected(_) => WorkflowErrorKind::CycleDetected,
            Self::ExternalCallFailure { .. } => WorkflowErrorKind::ExternalCallFailure,
            Self::DefinitionInvalid(_) => WorkflowErrorKind::DefinitionInvalid,
            Self::TypeConversion { .. } => WorkflowErrorKind::TypeConversion,
            Self::NodePanicked(_) => WorkflowErrorKind::NodePanicked,
            Self::Cancelled => WorkflowErrorKind::Cancelled,
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Provider { provider, message } => Self::external_call(provider, message),
            other => Self::external_call("collaborator", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::node_not_executed("nodeB");
        assert_eq!(err.to_string(), "Node 'nodeB' has not been executed yet");

        let err = WorkflowError::external_call("http", "Connection refused");
        assert_eq!(err.to_string(), "External call to http failed: Connection refused");

        let err = WorkflowError::type_conversion("\"abc\"", "Number");
        assert_eq!(err.to_string(), "Cannot convert \"abc\" to Number");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            WorkflowError::cycle_detected("a").kind(),
            WorkflowErrorKind::CycleDetected
        );
        assert_eq!(
            WorkflowError::index_out_of_range("a[3]", "len 2").kind(),
            WorkflowErrorKind::IndexOutOfRange
        );

        let json = serde_json::to_string(&WorkflowErrorKind::NodeNotExecuted).unwrap();
        assert_eq!(json, "\"node_not_executed\"");
    }

    #[test]
    fn test_from_domain_error() {
        let err: WorkflowError = DomainError::provider("openai", "rate limited").into();
        assert_eq!(err, WorkflowError::external_call("openai", "rate limited"));
    }
}

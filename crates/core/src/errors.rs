use thiserror::Error;

use crate::domain::approval::{ApprovalStatus, TeacherApprovalId};
use crate::domain::request::{DocumentRequestId, RequestStatus};
use crate::flows::FlowTransitionError;
use crate::validation::ValidationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request status transition from {from} to {to}")]
    InvalidStatusTransition { from: RequestStatus, to: RequestStatus },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("approval {approval_id} was already decided ({status})")]
    ApprovalAlreadyDecided { approval_id: TeacherApprovalId, status: ApprovalStatus },
    #[error(
        "request {request_id} cannot be approved: {approved}/{total} teacher approvals granted, {rejected} rejected"
    )]
    ApprovalGateBlocked {
        request_id: DocumentRequestId,
        approved: usize,
        rejected: usize,
        total: usize,
    },
    #[error("request {request_id} is {status} and can no longer be processed")]
    RequestClosed { request_id: DocumentRequestId, status: RequestStatus },
    #[error("unknown {kind} `{value}`")]
    UnknownValue { kind: &'static str, value: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("collaborator rejected the operation: {0}")]
    Collaborator(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Local failures are raised before any collaborator call is issued.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Domain(_))
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The action was refused. Check the form and try again.",
            Self::ServiceUnavailable { .. } => {
                "The action could not be completed. Please try again."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation",
            Self::ServiceUnavailable { .. } => "collaborator",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Collaborator(message) | ApplicationError::Network(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

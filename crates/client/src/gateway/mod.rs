//! The document-management collaborator and its implementations.
//!
//! Every persisted state change goes through [`DocumentGateway`]; callers only
//! sequence calls and reflect the returned state.

use async_trait::async_trait;
use thiserror::Error;

use sge_core::domain::approval::{ApprovalDecision, TeacherApproval, TeacherApprovalId};
use sge_core::domain::request::{
    DocumentRequest, DocumentRequestId, DocumentType, Language, RequestFilter,
};
use sge_core::documents::{OfficialDocument, PdfDocument};
use sge_core::errors::ApplicationError;
use sge_core::submission::{NewPresenceRequest, NewRequest};

pub mod http;
pub mod memory;

pub use http::HttpDocumentGateway;
pub use memory::InMemoryDocumentGateway;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not decode collaborator response: {0}")]
    Decode(String),
    #[error("configuration fault: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// The call never produced a usable answer from the collaborator.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Decode(_))
    }
}

impl From<GatewayError> for ApplicationError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Configuration(_) => Self::Configuration(error.to_string()),
            error if error.is_network() => Self::Network(error.to_string()),
            error => Self::Collaborator(error.to_string()),
        }
    }
}

#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Short backend name used in logs and `doctor` output.
    fn backend_name(&self) -> &'static str;

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DocumentRequest>, GatewayError>;

    async fn get_request(&self, id: &DocumentRequestId) -> Result<DocumentRequest, GatewayError>;

    async fn create_request(&self, request: &NewRequest) -> Result<DocumentRequest, GatewayError>;

    /// Creates the request and one pending approval per teacher atomically.
    async fn create_presence_request(
        &self,
        request: &NewPresenceRequest,
    ) -> Result<DocumentRequest, GatewayError>;

    async fn terminate_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError>;

    async fn reject_request(&self, id: &DocumentRequestId)
        -> Result<DocumentRequest, GatewayError>;

    async fn deliver_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError>;

    async fn download_request_pdf(
        &self,
        id: &DocumentRequestId,
    ) -> Result<PdfDocument, GatewayError>;

    async fn generate_certificate(
        &self,
        id: &DocumentRequestId,
        document_type: DocumentType,
        language: Language,
    ) -> Result<PdfDocument, GatewayError>;

    async fn upload_official_document(
        &self,
        id: &DocumentRequestId,
        document: &OfficialDocument,
    ) -> Result<(), GatewayError>;

    /// Approvals assigned to the calling teacher.
    async fn list_teacher_approvals(&self) -> Result<Vec<TeacherApproval>, GatewayError>;

    async fn update_approval(
        &self,
        id: &TeacherApprovalId,
        decision: ApprovalDecision,
    ) -> Result<TeacherApproval, GatewayError>;
}

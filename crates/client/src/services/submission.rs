use std::sync::Arc;

use tracing::{info, warn};

use sge_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use sge_core::domain::request::DocumentRequest;
use sge_core::domain::user::Session;
use sge_core::errors::{ApplicationError, DomainError};
use sge_core::submission::{RequestDraft, Submission};

use crate::gateway::DocumentGateway;

use super::new_correlation_id;

/// Validates a requester's draft and files it with the collaborator.
pub struct RequestSubmitter {
    gateway: Arc<dyn DocumentGateway>,
    session: Session,
    audit: Arc<dyn AuditSink>,
}

impl RequestSubmitter {
    pub fn new(gateway: Arc<dyn DocumentGateway>, session: Session) -> Self {
        Self { gateway, session, audit: Arc::new(TracingAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Local validation runs first; an invalid draft never reaches the collaborator.
    pub async fn submit(&self, draft: RequestDraft) -> Result<DocumentRequest, ApplicationError> {
        let correlation_id = new_correlation_id();
        let context =
            AuditContext::new(None, correlation_id.as_str(), self.session.user_id.0.as_str());
        let document_type = draft.document_type;

        let submission = match draft.validate() {
            Ok(submission) => submission,
            Err(error) => {
                warn!(
                    event_name = "submission.rejected_locally",
                    correlation_id = %correlation_id,
                    actor = %self.session.user_id,
                    document_type = %document_type,
                    error = %error,
                    "document request draft failed validation"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &context,
                        "submission.rejected_locally",
                        AuditCategory::Submission,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("document_type", document_type.as_str())
                    .with_metadata("error", error.to_string()),
                );
                return Err(DomainError::from(error).into());
            }
        };

        let (result, teachers) = match &submission {
            Submission::Standard(request) => (self.gateway.create_request(request).await, 0),
            Submission::Presence(request) => (
                self.gateway.create_presence_request(request).await,
                request.teachers.len(),
            ),
        };

        match result {
            Ok(created) => {
                info!(
                    event_name = "submission.created",
                    correlation_id = %correlation_id,
                    request_id = %created.id,
                    actor = %self.session.user_id,
                    document_type = %document_type,
                    teachers,
                    "document request submitted"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(created.id.clone()),
                        correlation_id,
                        "submission.created",
                        AuditCategory::Submission,
                        self.session.user_id.0.as_str(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("document_type", document_type.as_str())
                    .with_metadata("teachers", teachers.to_string()),
                );
                Ok(created)
            }
            Err(error) => {
                warn!(
                    event_name = "submission.failed",
                    correlation_id = %correlation_id,
                    actor = %self.session.user_id,
                    document_type = %document_type,
                    error = %error,
                    "collaborator refused the document request"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &context,
                        "submission.failed",
                        AuditCategory::Submission,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }
}

use std::sync::Arc;

use tracing::{info, warn};

use sge_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use sge_core::domain::approval::{ApprovalDecision, TeacherApproval, TeacherApprovalId};
use sge_core::domain::user::Session;
use sge_core::errors::{ApplicationError, DomainError};

use crate::gateway::DocumentGateway;

use super::new_correlation_id;

/// A teacher's view of the approval tasks assigned to them.
///
/// The local list is only ever replaced by a fresh fetch, never patched.
pub struct ApprovalDesk {
    gateway: Arc<dyn DocumentGateway>,
    session: Session,
    audit: Arc<dyn AuditSink>,
    approvals: Vec<TeacherApproval>,
}

impl ApprovalDesk {
    pub fn new(gateway: Arc<dyn DocumentGateway>, session: Session) -> Self {
        Self { gateway, session, audit: Arc::new(TracingAuditSink), approvals: Vec::new() }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn refresh(&mut self) -> Result<&[TeacherApproval], ApplicationError> {
        self.approvals = self.gateway.list_teacher_approvals().await?;
        Ok(&self.approvals)
    }

    pub fn approvals(&self) -> &[TeacherApproval] {
        &self.approvals
    }

    pub fn pending(&self) -> Vec<&TeacherApproval> {
        self.approvals.iter().filter(|approval| approval.is_pending()).collect()
    }

    /// Sends the decision, then re-fetches the list and returns the stored approval.
    pub async fn decide(
        &mut self,
        id: &TeacherApprovalId,
        decision: ApprovalDecision,
    ) -> Result<TeacherApproval, ApplicationError> {
        let correlation_id = new_correlation_id();
        let actor = self.session.user_id.0.as_str();
        let context = AuditContext::new(None, correlation_id.as_str(), actor);

        if let Some(known) = self.approvals.iter().find(|approval| &approval.id == id) {
            if !known.is_pending() {
                let error = DomainError::ApprovalAlreadyDecided {
                    approval_id: known.id.clone(),
                    status: known.status,
                };
                warn!(
                    event_name = "approval.already_decided",
                    correlation_id = %correlation_id,
                    request_id = %known.request_id,
                    actor = %self.session.user_id,
                    approval_id = %id,
                    "approval was already decided"
                );
                let outcome = AuditOutcome::Rejected;
                self.emit(&context, "approval.already_decided", outcome, id, decision);
                return Err(error.into());
            }
        }

        let updated = match self.gateway.update_approval(id, decision).await {
            Ok(updated) => updated,
            Err(error) => {
                warn!(
                    event_name = "approval.update_failed",
                    correlation_id = %correlation_id,
                    actor = %self.session.user_id,
                    approval_id = %id,
                    error = %error,
                    "collaborator refused the approval decision"
                );
                self.emit(&context, "approval.update_failed", AuditOutcome::Failed, id, decision);
                return Err(error.into());
            }
        };

        info!(
            event_name = "approval.decided",
            correlation_id = %correlation_id,
            request_id = %updated.request_id,
            actor = %self.session.user_id,
            approval_id = %id,
            status = %updated.status,
            "approval decision recorded"
        );
        self.emit(&context, "approval.decided", AuditOutcome::Success, id, decision);

        self.refresh().await?;
        Ok(self.approvals.iter().find(|approval| &approval.id == id).cloned().unwrap_or(updated))
    }

    fn emit(
        &self,
        context: &AuditContext,
        event_type: &str,
        outcome: AuditOutcome,
        id: &TeacherApprovalId,
        decision: ApprovalDecision,
    ) {
        self.audit.emit(
            AuditEvent::from_context(context, event_type, AuditCategory::Approval, outcome)
                .with_metadata("approval_id", id.0.as_str())
                .with_metadata("decision", format!("{decision:?}")),
        );
    }
}

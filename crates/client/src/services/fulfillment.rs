use std::sync::Arc;

use tracing::{info, warn};

use sge_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use sge_core::config::AppConfig;
use sge_core::domain::request::{DocumentRequest, DocumentRequestId};
use sge_core::domain::user::Session;
use sge_core::documents::{OfficialDocument, PdfDocument};
use sge_core::errors::{ApplicationError, DomainError};
use sge_core::flows::{
    FlowContext, FlowEngine, FlowTransitionError, FulfillmentFlow, PipelineAction, PipelineEvent,
    PipelineState,
};
use sge_core::validation::{validate_pdf_upload, MAX_UPLOAD_BYTES};

use crate::gateway::{DocumentGateway, GatewayError};

use super::new_correlation_id;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FulfillmentOptions {
    /// Refuse approval of a presence request until every teacher approved it.
    pub enforce_approval_gate: bool,
    pub upload_limit: u64,
}

impl Default for FulfillmentOptions {
    fn default() -> Self {
        Self { enforce_approval_gate: true, upload_limit: MAX_UPLOAD_BYTES }
    }
}

impl FulfillmentOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enforce_approval_gate: config.workflow.enforce_approval_gate,
            upload_limit: config.upload.max_bytes,
        }
    }
}

/// One staff pass over one request. Progress lives in a single
/// [`PipelineState`]; every step is checked against the flow before any
/// collaborator call, and the state only advances once the call succeeded.
pub struct FulfillmentSession {
    gateway: Arc<dyn DocumentGateway>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<FulfillmentFlow>,
    options: FulfillmentOptions,
    request: DocumentRequest,
    context: FlowContext,
    state: PipelineState,
    audit_context: AuditContext,
}

impl FulfillmentSession {
    /// Loads the request and starts a fresh pipeline at step 1. Rejected and
    /// delivered requests are refused.
    pub async fn open(
        gateway: Arc<dyn DocumentGateway>,
        session: &Session,
        id: &DocumentRequestId,
        options: FulfillmentOptions,
    ) -> Result<Self, ApplicationError> {
        let request = gateway.get_request(id).await?;
        if request.status.is_terminal() {
            warn!(
                event_name = "fulfillment.request_closed",
                request_id = %request.id,
                actor = %session.user_id,
                status = %request.status,
                "refusing to open a pipeline on a closed request"
            );
            return Err(DomainError::RequestClosed {
                request_id: request.id,
                status: request.status,
            }
            .into());
        }
        let engine = FlowEngine::new(FulfillmentFlow);
        let correlation_id = new_correlation_id();

        info!(
            event_name = "fulfillment.opened",
            correlation_id = %correlation_id,
            request_id = %request.id,
            actor = %session.user_id,
            document_type = %request.document_type,
            status = %request.status,
            "fulfillment pipeline opened"
        );

        Ok(Self {
            gateway,
            audit: Arc::new(TracingAuditSink),
            state: engine.initial_state(),
            engine,
            options,
            context: FlowContext::new(request.document_type),
            audit_context: AuditContext::new(
                Some(request.id.clone()),
                correlation_id,
                session.user_id.0.as_str(),
            ),
            request,
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn request(&self) -> &DocumentRequest {
        &self.request
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn available_actions(&self) -> Vec<PipelineAction> {
        self.engine.available_actions(self.state, &self.context)
    }

    pub fn approve_enabled(&self) -> bool {
        self.available_actions().contains(&PipelineAction::ApproveRequest)
    }

    /// Step 1.
    pub async fn download_request_pdf(&mut self) -> Result<PdfDocument, ApplicationError> {
        self.check(PipelineEvent::RequestPdfDownloaded)?;
        let document = self
            .gateway
            .download_request_pdf(&self.request.id)
            .await
            .map_err(|error| self.collaborator_failure("download_request_pdf", error))?;
        self.advance(PipelineEvent::RequestPdfDownloaded)?;
        Ok(document)
    }

    /// Step 2. Certificate types get a generated certificate in the request
    /// language; every other type is skipped without calling the collaborator.
    pub async fn prepare_certificate(&mut self) -> Result<Option<PdfDocument>, ApplicationError> {
        if !self.request.document_type.is_certificate() {
            self.check(PipelineEvent::CertificateSkipped)?;
            self.advance(PipelineEvent::CertificateSkipped)?;
            return Ok(None);
        }

        self.check(PipelineEvent::CertificateGenerated)?;
        let certificate = self
            .gateway
            .generate_certificate(
                &self.request.id,
                self.request.document_type,
                self.request.language,
            )
            .await
            .map_err(|error| self.collaborator_failure("generate_certificate", error))?;
        self.advance(PipelineEvent::CertificateGenerated)?;
        Ok(Some(certificate))
    }

    /// Builds an upload checked against the configured size limit.
    pub fn prepare_upload(
        &self,
        file_name: impl Into<String>,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<OfficialDocument, ApplicationError> {
        OfficialDocument::new(file_name, content_type, bytes, self.options.upload_limit)
            .map_err(|error| DomainError::from(error).into())
    }

    /// Step 3.
    pub async fn upload_official_document(
        &mut self,
        document: &OfficialDocument,
    ) -> Result<(), ApplicationError> {
        self.check(PipelineEvent::OfficialDocumentUploaded)?;
        validate_pdf_upload(document.content_type(), document.len(), self.options.upload_limit)
            .map_err(DomainError::from)?;

        self.gateway
            .upload_official_document(&self.request.id, document)
            .await
            .map_err(|error| self.collaborator_failure("upload_official_document", error))?;
        self.advance(PipelineEvent::OfficialDocumentUploaded)
    }

    /// Step 4, approve: the request becomes READY.
    pub async fn approve(&mut self) -> Result<&DocumentRequest, ApplicationError> {
        self.check(PipelineEvent::RequestApproved)?;

        if self.options.enforce_approval_gate
            && self.request.document_type.requires_teacher_approvals()
        {
            self.request = self
                .gateway
                .get_request(&self.request.id)
                .await
                .map_err(|error| self.collaborator_failure("get_request", error))?;

            let summary = self.request.approval_summary();
            if !summary.grants_presence() {
                let error = DomainError::ApprovalGateBlocked {
                    request_id: self.request.id.clone(),
                    approved: summary.approved,
                    rejected: summary.rejected,
                    total: summary.total,
                };
                warn!(
                    event_name = "fulfillment.approval_gate_blocked",
                    correlation_id = %self.audit_context.correlation_id,
                    request_id = %self.request.id,
                    actor = %self.audit_context.actor,
                    approved = summary.approved,
                    rejected = summary.rejected,
                    total = summary.total,
                    "teacher approvals are incomplete"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &self.audit_context,
                        "fulfillment.approval_gate_blocked",
                        AuditCategory::Fulfillment,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("approved", summary.approved.to_string())
                    .with_metadata("total", summary.total.to_string()),
                );
                return Err(error.into());
            }
        }

        self.request = self
            .gateway
            .terminate_request(&self.request.id)
            .await
            .map_err(|error| self.collaborator_failure("terminate_request", error))?;
        self.advance(PipelineEvent::RequestApproved)?;
        Ok(&self.request)
    }

    /// Step 4, reject: allowed from every open step.
    pub async fn reject(&mut self) -> Result<&DocumentRequest, ApplicationError> {
        self.check(PipelineEvent::RequestRejected)?;
        self.request = self
            .gateway
            .reject_request(&self.request.id)
            .await
            .map_err(|error| self.collaborator_failure("reject_request", error))?;
        self.advance(PipelineEvent::RequestRejected)?;
        Ok(&self.request)
    }

    fn check(&self, event: PipelineEvent) -> Result<(), ApplicationError> {
        match self.engine.ensure(self.state, event, &self.context) {
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(
                    event_name = "fulfillment.step_refused",
                    correlation_id = %self.audit_context.correlation_id,
                    request_id = %self.request.id,
                    actor = %self.audit_context.actor,
                    state = ?self.state,
                    pipeline_event = ?event,
                    error = %error,
                    "pipeline step attempted out of order"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &self.audit_context,
                        "fulfillment.transition_rejected",
                        AuditCategory::Fulfillment,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(local(error))
            }
        }
    }

    fn advance(&mut self, event: PipelineEvent) -> Result<(), ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(
                self.state,
                event,
                &self.context,
                self.audit.as_ref(),
                &self.audit_context,
            )
            .map_err(local)?;

        info!(
            event_name = "fulfillment.step_completed",
            correlation_id = %self.audit_context.correlation_id,
            request_id = %self.request.id,
            actor = %self.audit_context.actor,
            from = ?outcome.from,
            to = ?outcome.to,
            "pipeline step completed"
        );
        self.state = outcome.to;
        Ok(())
    }

    fn collaborator_failure(
        &self,
        operation: &'static str,
        error: GatewayError,
    ) -> ApplicationError {
        warn!(
            event_name = "fulfillment.collaborator_failed",
            correlation_id = %self.audit_context.correlation_id,
            request_id = %self.request.id,
            actor = %self.audit_context.actor,
            operation,
            state = ?self.state,
            error = %error,
            "collaborator call failed; pipeline stays on the current step"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &self.audit_context,
                "fulfillment.collaborator_failed",
                AuditCategory::Gateway,
                AuditOutcome::Failed,
            )
            .with_metadata("operation", operation)
            .with_metadata("error", error.to_string()),
        );
        error.into()
    }
}

fn local(error: FlowTransitionError) -> ApplicationError {
    DomainError::from(error).into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use sge_core::audit::InMemoryAuditSink;
    use sge_core::domain::approval::{ApprovalDecision, TeacherApproval, TeacherApprovalId};
    use sge_core::domain::request::{
        DocumentRequest, DocumentRequestId, DocumentType, Language, RequestFilter, RequestStatus,
    };
    use sge_core::domain::user::{Role, Session};
    use sge_core::documents::{OfficialDocument, PdfDocument};
    use sge_core::errors::{ApplicationError, DomainError};
    use sge_core::flows::{FlowTransitionError, PipelineAction, PipelineState};
    use sge_core::submission::{NewPresenceRequest, NewRequest};
    use sge_core::validation::{ValidationError, MAX_UPLOAD_BYTES};

    use crate::gateway::{DocumentGateway, GatewayError, InMemoryDocumentGateway};

    use super::{FulfillmentOptions, FulfillmentSession};

    fn staff() -> InMemoryDocumentGateway {
        InMemoryDocumentGateway::seeded(Session::new("adm-001", Role::Administrator))
    }

    async fn open(
        gateway: &InMemoryDocumentGateway,
        id: &str,
        options: FulfillmentOptions,
    ) -> FulfillmentSession {
        FulfillmentSession::open(
            Arc::new(gateway.clone()),
            gateway.session(),
            &DocumentRequestId(id.to_string()),
            options,
        )
        .await
        .expect("request opens")
    }

    /// Serves requests without their approval list, as a collaborator that
    /// omits the nested approvals would.
    struct WithoutApprovals(InMemoryDocumentGateway);

    #[async_trait]
    impl DocumentGateway for WithoutApprovals {
        fn backend_name(&self) -> &'static str {
            "without-approvals"
        }

        async fn list_requests(
            &self,
            filter: &RequestFilter,
        ) -> Result<Vec<DocumentRequest>, GatewayError> {
            self.0.list_requests(filter).await
        }

        async fn get_request(
            &self,
            id: &DocumentRequestId,
        ) -> Result<DocumentRequest, GatewayError> {
            let mut request = self.0.get_request(id).await?;
            request.presence_approvals.clear();
            Ok(request)
        }

        async fn create_request(
            &self,
            request: &NewRequest,
        ) -> Result<DocumentRequest, GatewayError> {
            self.0.create_request(request).await
        }

        async fn create_presence_request(
            &self,
            request: &NewPresenceRequest,
        ) -> Result<DocumentRequest, GatewayError> {
            self.0.create_presence_request(request).await
        }

        async fn terminate_request(
            &self,
            id: &DocumentRequestId,
        ) -> Result<DocumentRequest, GatewayError> {
            self.0.terminate_request(id).await
        }

        async fn reject_request(
            &self,
            id: &DocumentRequestId,
        ) -> Result<DocumentRequest, GatewayError> {
            self.0.reject_request(id).await
        }

        async fn deliver_request(
            &self,
            id: &DocumentRequestId,
        ) -> Result<DocumentRequest, GatewayError> {
            self.0.deliver_request(id).await
        }

        async fn download_request_pdf(
            &self,
            id: &DocumentRequestId,
        ) -> Result<PdfDocument, GatewayError> {
            self.0.download_request_pdf(id).await
        }

        async fn generate_certificate(
            &self,
            id: &DocumentRequestId,
            document_type: DocumentType,
            language: Language,
        ) -> Result<PdfDocument, GatewayError> {
            self.0.generate_certificate(id, document_type, language).await
        }

        async fn upload_official_document(
            &self,
            id: &DocumentRequestId,
            document: &OfficialDocument,
        ) -> Result<(), GatewayError> {
            self.0.upload_official_document(id, document).await
        }

        async fn list_teacher_approvals(&self) -> Result<Vec<TeacherApproval>, GatewayError> {
            self.0.list_teacher_approvals().await
        }

        async fn update_approval(
            &self,
            id: &TeacherApprovalId,
            decision: ApprovalDecision,
        ) -> Result<TeacherApproval, GatewayError> {
            self.0.update_approval(id, decision).await
        }
    }

    async fn run_to_decision(session: &mut FulfillmentSession) {
        session.download_request_pdf().await.expect("step 1");
        session.prepare_certificate().await.expect("step 2");
        let upload = session
            .prepare_upload("signed.pdf", "application/pdf", b"%PDF-1.7 signed".to_vec())
            .expect("valid pdf");
        session.upload_official_document(&upload).await.expect("step 3");
    }

    #[tokio::test]
    async fn transcript_skips_certificate_without_a_call() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0001", FulfillmentOptions::default()).await;
        assert_eq!(session.state(), PipelineState::AwaitingDownload);

        let pdf = session.download_request_pdf().await.expect("download");
        assert_eq!(pdf.file_name, "demande_REQ-0001.pdf");
        assert_eq!(session.prepare_certificate().await.expect("skip"), None);
        assert_eq!(session.state(), PipelineState::AwaitingUpload);

        let operations = gateway.operations().await;
        assert_eq!(operations, vec!["get_request", "download_request_pdf"]);
    }

    #[tokio::test]
    async fn certificate_types_generate_in_request_language() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0003", FulfillmentOptions::default()).await;

        session.download_request_pdf().await.expect("download");
        let certificate =
            session.prepare_certificate().await.expect("generate").expect("certificate");
        assert_eq!(certificate.file_name, "certificate_success_REQ-0003_ar.pdf");
        assert!(gateway.operations().await.contains(&"generate_certificate".to_string()));
    }

    #[tokio::test]
    async fn out_of_order_steps_fail_locally() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0003", FulfillmentOptions::default()).await;
        let calls = gateway.operations().await.len();

        let upload = session
            .prepare_upload("signed.pdf", "application/pdf", b"%PDF".to_vec())
            .expect("valid pdf");
        let error = session.upload_official_document(&upload).await.expect_err("too early");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::FlowTransition(
                FlowTransitionError::InvalidTransition { .. }
            ))
        ));
        assert!(session.approve().await.is_err());
        assert_eq!(session.state(), PipelineState::AwaitingDownload);
        assert_eq!(gateway.operations().await.len(), calls);
    }

    #[tokio::test]
    async fn approve_is_only_enabled_after_upload() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0001", FulfillmentOptions::default()).await;
        assert!(!session.approve_enabled());
        assert!(session.available_actions().contains(&PipelineAction::RejectRequest));

        session.download_request_pdf().await.expect("step 1");
        assert!(!session.approve_enabled());
        session.prepare_certificate().await.expect("step 2");
        assert!(!session.approve_enabled());

        let upload = session
            .prepare_upload("signed.pdf", "application/pdf", b"%PDF".to_vec())
            .expect("valid pdf");
        session.upload_official_document(&upload).await.expect("step 3");
        assert!(session.approve_enabled());

        let request = session.approve().await.expect("approve");
        assert_eq!(request.status, RequestStatus::Ready);
        assert_eq!(session.state(), PipelineState::Approved);
        assert!(session.available_actions().is_empty());
    }

    #[tokio::test]
    async fn invalid_uploads_are_refused_before_any_call() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0001", FulfillmentOptions::default()).await;
        session.download_request_pdf().await.expect("step 1");
        session.prepare_certificate().await.expect("step 2");
        let calls = gateway.operations().await.len();

        let word = session.prepare_upload(
            "signed.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            b"PK".to_vec(),
        );
        assert!(matches!(
            word,
            Err(ApplicationError::Domain(DomainError::Validation(
                ValidationError::UnsupportedFileType { .. }
            )))
        ));

        let oversized = vec![0_u8; (MAX_UPLOAD_BYTES + 1) as usize];
        let large = session.prepare_upload("big.pdf", "application/pdf", oversized);
        assert!(matches!(
            large,
            Err(ApplicationError::Domain(DomainError::Validation(
                ValidationError::FileTooLarge { .. }
            )))
        ));

        assert_eq!(session.state(), PipelineState::AwaitingUpload);
        assert_eq!(gateway.operations().await.len(), calls);
    }

    #[tokio::test]
    async fn collaborator_failure_keeps_the_current_step() {
        let gateway = InMemoryDocumentGateway::seeded(Session::new("stu-002", Role::Student));
        let mut session = open(&gateway, "REQ-0003", FulfillmentOptions::default()).await;
        session.download_request_pdf().await.expect("owners may download");

        let error = session.prepare_certificate().await.expect_err("students cannot generate");
        assert!(matches!(error, ApplicationError::Collaborator(_)));
        assert_eq!(session.state(), PipelineState::AwaitingCertificateOrSkip);
    }

    #[tokio::test]
    async fn presence_approval_waits_for_every_teacher() {
        let gateway = staff();
        let sink = InMemoryAuditSink::default();
        let mut session = open(&gateway, "REQ-0002", FulfillmentOptions::default())
            .await
            .with_audit_sink(Arc::new(sink.clone()));
        run_to_decision(&mut session).await;
        assert!(session.approve_enabled());

        let error = session.approve().await.expect_err("approvals still pending");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::ApprovalGateBlocked { approved: 0, total: 2, .. })
        ));
        assert_eq!(session.state(), PipelineState::ReadyToDecide);
        assert!(sink
            .events()
            .iter()
            .any(|event| event.event_type == "fulfillment.approval_gate_blocked"));

        for (teacher, approval) in [("tch-001", "APR-0001"), ("tch-002", "APR-0002")] {
            let approval = TeacherApprovalId(approval.to_string());
            gateway
                .with_session(Session::new(teacher, Role::Teacher))
                .update_approval(&approval, ApprovalDecision::Approved)
                .await
                .expect("teacher approves");
        }

        let request = session.approve().await.expect("gate is open");
        assert_eq!(request.status, RequestStatus::Ready);
    }

    #[tokio::test]
    async fn presence_request_without_approvals_stays_blocked() {
        let inner = staff();
        let session_user = inner.session().clone();
        let gateway: Arc<dyn DocumentGateway> = Arc::new(WithoutApprovals(inner.clone()));
        let mut session = FulfillmentSession::open(
            gateway,
            &session_user,
            &DocumentRequestId("REQ-0002".to_string()),
            FulfillmentOptions::default(),
        )
        .await
        .expect("request opens");
        run_to_decision(&mut session).await;

        let error = session.approve().await.expect_err("no approvals to count");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::ApprovalGateBlocked { approved: 0, total: 0, .. })
        ));
        assert_eq!(session.state(), PipelineState::ReadyToDecide);
        assert!(!inner.operations().await.contains(&"terminate_request".to_string()));
    }

    #[tokio::test]
    async fn closed_requests_do_not_open() {
        let gateway = staff();
        let id = DocumentRequestId("REQ-0001".to_string());
        gateway.reject_request(&id).await.expect("reject");

        let refused = FulfillmentSession::open(
            Arc::new(gateway.clone()),
            gateway.session(),
            &id,
            FulfillmentOptions::default(),
        )
        .await;
        assert!(matches!(
            refused,
            Err(ApplicationError::Domain(DomainError::RequestClosed {
                status: RequestStatus::Rejected,
                ..
            }))
        ));
        assert!(gateway.uploads(&id).await.is_empty());
    }

    #[tokio::test]
    async fn staff_may_override_the_approval_gate() {
        let gateway = staff();
        let options = FulfillmentOptions { enforce_approval_gate: false, ..Default::default() };
        let mut session = open(&gateway, "REQ-0002", options).await;
        run_to_decision(&mut session).await;

        let request = session.approve().await.expect("override");
        assert_eq!(request.status, RequestStatus::Ready);
    }

    #[tokio::test]
    async fn reject_from_the_first_step() {
        let gateway = staff();
        let mut session = open(&gateway, "REQ-0001", FulfillmentOptions::default()).await;

        let request = session.reject().await.expect("reject");
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(session.state(), PipelineState::Rejected);
        assert!(session.reject().await.is_err());
        assert_eq!(gateway.operations().await, vec!["get_request", "reject_request"]);
    }
}

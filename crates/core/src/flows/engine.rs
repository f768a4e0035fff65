use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::DocumentType;
use crate::flows::states::{
    FlowContext, PipelineAction, PipelineEvent, PipelineState, TransitionOutcome,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> PipelineState;
    fn transition(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
    fn available_actions(&self, state: PipelineState, context: &FlowContext)
        -> Vec<PipelineAction>;
}

/// Download, certificate, upload, decision.
#[derive(Clone, Debug, Default)]
pub struct FulfillmentFlow;

impl FlowDefinition for FulfillmentFlow {
    fn initial_state(&self) -> PipelineState {
        PipelineState::AwaitingDownload
    }

    fn transition(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let to = transition_fulfillment(current, event, context)?;
        Ok(TransitionOutcome {
            from: current,
            to,
            event,
            actions: fulfillment_actions(to, context),
        })
    }

    fn available_actions(
        &self,
        state: PipelineState,
        context: &FlowContext,
    ) -> Vec<PipelineAction> {
        fulfillment_actions(state, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> PipelineState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    /// Checks a transition without committing to it, so callers can refuse
    /// an out-of-order step before doing any I/O.
    pub fn ensure(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        context: &FlowContext,
    ) -> Result<PipelineState, FlowTransitionError> {
        self.apply(current, event, context).map(|outcome| outcome.to)
    }

    pub fn available_actions(
        &self,
        state: PipelineState,
        context: &FlowContext,
    ) -> Vec<PipelineAction> {
        self.flow.available_actions(state, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: PipelineState,
        event: PipelineEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "fulfillment.transition_applied",
                        AuditCategory::Fulfillment,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "fulfillment.transition_rejected",
                        AuditCategory::Fulfillment,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<FulfillmentFlow> {
    fn default() -> Self {
        Self::new(FulfillmentFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{event:?} is not allowed while the pipeline is {state:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
    #[error("{document_type} requires a generated certificate before upload")]
    CertificateRequired { document_type: DocumentType },
    #[error("{document_type} has no certificate to generate")]
    CertificateNotApplicable { document_type: DocumentType },
    #[error("the pipeline is already closed ({state:?})")]
    PipelineClosed { state: PipelineState },
}

fn transition_fulfillment(
    current: PipelineState,
    event: PipelineEvent,
    context: &FlowContext,
) -> Result<PipelineState, FlowTransitionError> {
    use PipelineEvent::{
        CertificateGenerated, CertificateSkipped, OfficialDocumentUploaded, RequestApproved,
        RequestPdfDownloaded, RequestRejected,
    };
    use PipelineState::{
        Approved, AwaitingCertificateOrSkip, AwaitingDownload, AwaitingUpload, ReadyToDecide,
        Rejected,
    };

    if current.is_terminal() {
        return Err(FlowTransitionError::PipelineClosed { state: current });
    }

    let certificate = context.document_type.is_certificate();
    let to = match (current, event) {
        (AwaitingDownload, RequestPdfDownloaded) => AwaitingCertificateOrSkip,
        (AwaitingCertificateOrSkip, CertificateGenerated) if certificate => AwaitingUpload,
        (AwaitingCertificateOrSkip, CertificateGenerated) => {
            return Err(FlowTransitionError::CertificateNotApplicable {
                document_type: context.document_type,
            });
        }
        (AwaitingCertificateOrSkip, CertificateSkipped) if !certificate => AwaitingUpload,
        (AwaitingCertificateOrSkip, CertificateSkipped) => {
            return Err(FlowTransitionError::CertificateRequired {
                document_type: context.document_type,
            });
        }
        (AwaitingUpload, OfficialDocumentUploaded) => ReadyToDecide,
        (ReadyToDecide, RequestApproved) => Approved,
        (_, RequestRejected) => Rejected,
        _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(to)
}

fn fulfillment_actions(state: PipelineState, context: &FlowContext) -> Vec<PipelineAction> {
    use PipelineAction::{
        ApproveRequest, DownloadRequestPdf, GenerateCertificate, RejectRequest, SkipCertificate,
        UploadOfficialDocument,
    };

    match state {
        PipelineState::AwaitingDownload => vec![DownloadRequestPdf, RejectRequest],
        PipelineState::AwaitingCertificateOrSkip if context.document_type.is_certificate() => {
            vec![GenerateCertificate, RejectRequest]
        }
        PipelineState::AwaitingCertificateOrSkip => vec![SkipCertificate, RejectRequest],
        PipelineState::AwaitingUpload => vec![UploadOfficialDocument, RejectRequest],
        PipelineState::ReadyToDecide => vec![ApproveRequest, RejectRequest],
        PipelineState::Approved | PipelineState::Rejected => Vec::new(),
    }
}

use serde::{Deserialize, Serialize};

use crate::domain::request::DocumentType;

/// Progress of one staff fulfillment pass over a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    AwaitingDownload,
    AwaitingCertificateOrSkip,
    AwaitingUpload,
    ReadyToDecide,
    Approved,
    Rejected,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// 1-based pipeline step the state is waiting on; `None` once decided.
    pub fn step(self) -> Option<u8> {
        match self {
            Self::AwaitingDownload => Some(1),
            Self::AwaitingCertificateOrSkip => Some(2),
            Self::AwaitingUpload => Some(3),
            Self::ReadyToDecide => Some(4),
            Self::Approved | Self::Rejected => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineEvent {
    RequestPdfDownloaded,
    CertificateGenerated,
    CertificateSkipped,
    OfficialDocumentUploaded,
    RequestApproved,
    RequestRejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub document_type: DocumentType,
}

impl FlowContext {
    pub fn new(document_type: DocumentType) -> Self {
        Self { document_type }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineAction {
    DownloadRequestPdf,
    GenerateCertificate,
    SkipCertificate,
    UploadOfficialDocument,
    ApproveRequest,
    RejectRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
    /// Actions available from `to`.
    pub actions: Vec<PipelineAction>,
}

pub mod audit;
pub mod config;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod status;
pub mod submission;
pub mod validation;

pub use documents::{OfficialDocument, PdfDocument};
pub use domain::approval::{
    ApprovalDecision, ApprovalStatus, ApprovalSummary, TeacherApproval, TeacherApprovalId,
};
pub use domain::request::{
    DocumentRequest, DocumentRequestId, DocumentType, Language, ReceptionType, RequestFilter,
    RequestStatus, StatusChange,
};
pub use domain::user::{Role, Session, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, FlowTransitionError, FulfillmentFlow, PipelineAction, PipelineState};
pub use status::{Badge, BadgeColor, StatusBadge};
pub use submission::{NewPresenceRequest, NewRequest, RequestDraft, Submission};
pub use validation::ValidationError;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use sge_core::domain::approval::{
    ApprovalDecision, ApprovalStatus, TeacherApproval, TeacherApprovalId,
};
use sge_core::domain::request::{
    DocumentRequest, DocumentRequestId, DocumentType, Language, ReceptionType, RequestFilter,
    RequestStatus,
};
use sge_core::domain::user::{Session, UserId};
use sge_core::documents::{OfficialDocument, PdfDocument};
use sge_core::errors::DomainError;
use sge_core::submission::{NewPresenceRequest, NewRequest};
use sge_core::validation::{validate_pdf_upload, validate_teacher_selection, MAX_UPLOAD_BYTES};

use super::{DocumentGateway, GatewayError};

/// Actor recorded when the last teacher approval moves a request forward.
pub const APPROVAL_GATE_ACTOR: &str = "approval-gate";

/// A stored upload, kept so tests can inspect what staff sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    pub size: u64,
    pub uploaded_by: UserId,
}

#[derive(Debug, Default)]
struct Store {
    requests: BTreeMap<DocumentRequestId, DocumentRequest>,
    uploads: BTreeMap<DocumentRequestId, Vec<StoredUpload>>,
    operations: Vec<String>,
    next_request: u32,
    next_approval: u32,
}

impl Store {
    fn next_request_id(&mut self) -> DocumentRequestId {
        self.next_request += 1;
        DocumentRequestId(format!("REQ-{:04}", self.next_request))
    }

    fn next_approval_id(&mut self) -> TeacherApprovalId {
        self.next_approval += 1;
        TeacherApprovalId(format!("APR-{:04}", self.next_approval))
    }

    fn request_mut(
        &mut self,
        id: &DocumentRequestId,
    ) -> Result<&mut DocumentRequest, GatewayError> {
        self.requests.get_mut(id).ok_or_else(|| not_found(id))
    }
}

/// Collaborator fake backed by a shared in-process store.
///
/// Views created with [`InMemoryDocumentGateway::with_session`] share the store,
/// so a test can act as a student, a teacher and staff against the same data.
#[derive(Clone)]
pub struct InMemoryDocumentGateway {
    store: Arc<RwLock<Store>>,
    session: Session,
    upload_limit: u64,
}

impl InMemoryDocumentGateway {
    pub fn new(session: Session) -> Self {
        Self { store: Arc::default(), session, upload_limit: MAX_UPLOAD_BYTES }
    }

    /// A store pre-filled with a small deterministic dataset.
    pub fn seeded(session: Session) -> Self {
        let mut store = Store::default();
        if let Err(error) = seed(&mut store) {
            warn!(
                event_name = "gateway.memory.seed_failed",
                error = %error,
                "seeded dataset is incomplete"
            );
        }
        Self { store: Arc::new(RwLock::new(store)), session, upload_limit: MAX_UPLOAD_BYTES }
    }

    pub fn with_session(&self, session: Session) -> Self {
        Self { store: Arc::clone(&self.store), session, upload_limit: self.upload_limit }
    }

    pub fn with_upload_limit(mut self, limit: u64) -> Self {
        self.upload_limit = limit.min(MAX_UPLOAD_BYTES);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Names of every operation invoked on the shared store, in call order.
    pub async fn operations(&self) -> Vec<String> {
        self.store.read().await.operations.clone()
    }

    pub async fn uploads(&self, id: &DocumentRequestId) -> Vec<StoredUpload> {
        self.store.read().await.uploads.get(id).cloned().unwrap_or_default()
    }

    async fn record(&self, operation: &str) {
        debug!(
            event_name = "gateway.memory.call",
            operation,
            actor = %self.session.user_id,
            "in-memory gateway call"
        );
        self.store.write().await.operations.push(operation.to_string());
    }

    fn require_staff(&self, operation: &str) -> Result<(), GatewayError> {
        if self.session.role.is_staff() {
            Ok(())
        } else {
            Err(GatewayError::PermissionDenied(format!(
                "{operation} requires an administrator, not {}",
                self.session.role.as_str()
            )))
        }
    }

    fn require_requester(&self) -> Result<(), GatewayError> {
        if self.session.role.can_request_documents() {
            Ok(())
        } else {
            Err(GatewayError::PermissionDenied(format!(
                "{} cannot request documents",
                self.session.role.as_str()
            )))
        }
    }

    fn can_view(&self, request: &DocumentRequest) -> bool {
        let user = &self.session.user_id;
        self.session.role.is_staff()
            || &request.requester == user
            || request.presence_approvals.iter().any(|approval| &approval.teacher == user)
    }

    async fn move_request(
        &self,
        id: &DocumentRequestId,
        next: RequestStatus,
    ) -> Result<DocumentRequest, GatewayError> {
        let mut store = self.store.write().await;
        let request = store.request_mut(id)?;
        request
            .transition_to(next, self.session.user_id.0.clone(), None, Utc::now())
            .map_err(conflict)?;
        Ok(request.clone())
    }

    async fn insert_request(
        &self,
        document_type: DocumentType,
        language: Language,
        reception_type: ReceptionType,
        academic_year: &str,
        additional_info: Option<String>,
        teachers: &[UserId],
    ) -> DocumentRequest {
        let now = Utc::now();
        let mut store = self.store.write().await;
        let id = store.next_request_id();
        let presence_approvals = teachers
            .iter()
            .map(|teacher| TeacherApproval {
                id: store.next_approval_id(),
                request_id: id.clone(),
                teacher: teacher.clone(),
                status: ApprovalStatus::Pending,
                created_at: now,
                decided_at: None,
            })
            .collect();

        let request = DocumentRequest {
            id: id.clone(),
            document_type,
            language,
            reception_type,
            academic_year: academic_year.to_string(),
            status: RequestStatus::New,
            requester: self.session.user_id.clone(),
            additional_info,
            created_at: now,
            history: Vec::new(),
            presence_approvals,
        };
        store.requests.insert(id, request.clone());
        request
    }
}

fn not_found(id: impl std::fmt::Display) -> GatewayError {
    GatewayError::NotFound(format!("no document request or approval `{id}`"))
}

fn not_visible(id: &DocumentRequestId) -> GatewayError {
    GatewayError::PermissionDenied(format!("request {id} belongs to another user"))
}

fn conflict(error: DomainError) -> GatewayError {
    GatewayError::Conflict(error.to_string())
}

fn rejected(status: u16, message: impl ToString) -> GatewayError {
    GatewayError::Rejected { status, message: message.to_string() }
}

fn fake_pdf(title: &str) -> Vec<u8> {
    format!("%PDF-1.4\n% {title}\n%%EOF\n").into_bytes()
}

#[async_trait]
impl DocumentGateway for InMemoryDocumentGateway {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DocumentRequest>, GatewayError> {
        self.record("list_requests").await;
        let store = self.store.read().await;
        Ok(store
            .requests
            .values()
            .filter(|request| self.can_view(request) && filter.matches(request))
            .cloned()
            .collect())
    }

    async fn get_request(&self, id: &DocumentRequestId) -> Result<DocumentRequest, GatewayError> {
        self.record("get_request").await;
        let store = self.store.read().await;
        let request = store.requests.get(id).ok_or_else(|| not_found(id))?;
        if !self.can_view(request) {
            return Err(not_visible(id));
        }
        Ok(request.clone())
    }

    async fn create_request(&self, request: &NewRequest) -> Result<DocumentRequest, GatewayError> {
        self.record("create_request").await;
        self.require_requester()?;
        if request.document_type.requires_teacher_approvals() {
            return Err(rejected(400, "presence certificates must name their teachers"));
        }
        if request.academic_year.trim().is_empty() {
            return Err(rejected(400, "academic_year is required"));
        }

        Ok(self
            .insert_request(
                request.document_type,
                request.language,
                request.reception_type,
                &request.academic_year,
                request.additional_info.clone(),
                &[],
            )
            .await)
    }

    async fn create_presence_request(
        &self,
        request: &NewPresenceRequest,
    ) -> Result<DocumentRequest, GatewayError> {
        self.record("create_presence_request").await;
        self.require_requester()?;
        validate_teacher_selection(&request.teachers).map_err(|error| rejected(400, error))?;
        if request.academic_year.trim().is_empty() {
            return Err(rejected(400, "academic_year is required"));
        }

        Ok(self
            .insert_request(
                DocumentType::CertificatePresence,
                request.language,
                request.reception_type,
                &request.academic_year,
                request.additional_info.clone(),
                &request.teachers,
            )
            .await)
    }

    async fn terminate_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        self.record("terminate_request").await;
        self.require_staff("terminate_request")?;
        self.move_request(id, RequestStatus::Ready).await
    }

    async fn reject_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        self.record("reject_request").await;
        self.require_staff("reject_request")?;
        self.move_request(id, RequestStatus::Rejected).await
    }

    async fn deliver_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        self.record("deliver_request").await;
        self.require_staff("deliver_request")?;
        self.move_request(id, RequestStatus::Delivered).await
    }

    async fn download_request_pdf(
        &self,
        id: &DocumentRequestId,
    ) -> Result<PdfDocument, GatewayError> {
        self.record("download_request_pdf").await;
        let store = self.store.read().await;
        let request = store.requests.get(id).ok_or_else(|| not_found(id))?;
        if !self.can_view(request) {
            return Err(not_visible(id));
        }
        let title = format!("Demande {id} {} {}", request.document_type, request.academic_year);
        Ok(PdfDocument::request_pdf(id, fake_pdf(&title)))
    }

    async fn generate_certificate(
        &self,
        id: &DocumentRequestId,
        document_type: DocumentType,
        language: Language,
    ) -> Result<PdfDocument, GatewayError> {
        self.record("generate_certificate").await;
        self.require_staff("generate_certificate")?;
        if !document_type.is_certificate() {
            return Err(rejected(400, format!("{document_type} has no certificate template")));
        }
        let store = self.store.read().await;
        let request = store.requests.get(id).ok_or_else(|| not_found(id))?;
        let title = format!("{document_type} {} {}", request.requester, language.as_str());
        Ok(PdfDocument::certificate(id, document_type, language, fake_pdf(&title)))
    }

    async fn upload_official_document(
        &self,
        id: &DocumentRequestId,
        document: &OfficialDocument,
    ) -> Result<(), GatewayError> {
        self.record("upload_official_document").await;
        self.require_staff("upload_official_document")?;
        validate_pdf_upload(document.content_type(), document.len(), self.upload_limit)
            .map_err(|error| rejected(413, error))?;

        let mut store = self.store.write().await;
        let status = store.requests.get(id).ok_or_else(|| not_found(id))?.status;
        if status.is_terminal() {
            return Err(GatewayError::Conflict(format!(
                "request {id} is {status}; uploads are closed"
            )));
        }
        store.uploads.entry(id.clone()).or_default().push(StoredUpload {
            file_name: document.file_name().to_string(),
            size: document.len(),
            uploaded_by: self.session.user_id.clone(),
        });
        Ok(())
    }

    async fn list_teacher_approvals(&self) -> Result<Vec<TeacherApproval>, GatewayError> {
        self.record("list_teacher_approvals").await;
        let store = self.store.read().await;
        Ok(store
            .requests
            .values()
            .flat_map(|request| request.presence_approvals.iter())
            .filter(|approval| approval.teacher == self.session.user_id)
            .cloned()
            .collect())
    }

    async fn update_approval(
        &self,
        id: &TeacherApprovalId,
        decision: ApprovalDecision,
    ) -> Result<TeacherApproval, GatewayError> {
        self.record("update_approval").await;
        let now = Utc::now();
        let mut store = self.store.write().await;
        let request = store
            .requests
            .values_mut()
            .find(|request| request.presence_approvals.iter().any(|approval| &approval.id == id))
            .ok_or_else(|| not_found(id))?;

        let approval = request
            .presence_approvals
            .iter_mut()
            .find(|approval| &approval.id == id)
            .ok_or_else(|| not_found(id))?;
        if approval.teacher != self.session.user_id {
            return Err(GatewayError::PermissionDenied(format!(
                "approval {id} is assigned to another teacher"
            )));
        }
        approval.decide(decision, now).map_err(conflict)?;
        let decided = approval.clone();

        if request.approval_summary().is_complete() && request.status == RequestStatus::New {
            request
                .transition_to(
                    RequestStatus::InProgress,
                    APPROVAL_GATE_ACTOR,
                    Some("all teacher approvals granted".to_string()),
                    now,
                )
                .map_err(conflict)?;
        }

        Ok(decided)
    }
}

/// Base instant of the seeded dataset: 2025-10-01T08:00:00Z.
fn seed_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_759_305_600, 0).unwrap_or_default()
}

fn seed_request(
    store: &mut Store,
    document_type: DocumentType,
    language: Language,
    requester: &str,
    teachers: &[&str],
    created_at: DateTime<Utc>,
) -> DocumentRequestId {
    let id = store.next_request_id();
    let presence_approvals = teachers
        .iter()
        .map(|teacher| TeacherApproval {
            id: store.next_approval_id(),
            request_id: id.clone(),
            teacher: UserId((*teacher).to_string()),
            status: ApprovalStatus::Pending,
            created_at,
            decided_at: None,
        })
        .collect();

    let request = DocumentRequest {
        id: id.clone(),
        document_type,
        language,
        reception_type: ReceptionType::Online,
        academic_year: "2025-2026".to_string(),
        status: RequestStatus::New,
        requester: UserId(requester.to_string()),
        additional_info: None,
        created_at,
        history: Vec::new(),
        presence_approvals,
    };
    store.requests.insert(id.clone(), request);
    id
}

fn seed(store: &mut Store) -> Result<(), DomainError> {
    let epoch = seed_epoch();
    let at = |hours: i64| epoch + Duration::hours(hours);

    seed_request(store, DocumentType::Transcript, Language::Fr, "stu-001", &[], at(0));
    seed_request(
        store,
        DocumentType::CertificatePresence,
        Language::Fr,
        "stu-001",
        &["tch-001", "tch-002"],
        at(1),
    );
    let in_progress =
        seed_request(store, DocumentType::CertificateSuccess, Language::Ar, "stu-002", &[], at(2));
    let ready = seed_request(store, DocumentType::Diploma, Language::Fr, "tch-003", &[], at(3));

    store
        .request_mut(&in_progress)
        .map_err(|error| DomainError::InvariantViolation(error.to_string()))?
        .transition_to(RequestStatus::InProgress, "adm-001", None, at(26))?;
    store
        .request_mut(&ready)
        .map_err(|error| DomainError::InvariantViolation(error.to_string()))?
        .transition_to(RequestStatus::Ready, "adm-001", None, at(27))?;
    Ok(())
}

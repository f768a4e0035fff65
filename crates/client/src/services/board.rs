use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use sge_core::domain::approval::{
    ApprovalStatus, ApprovalSummary, TeacherApproval, TeacherApprovalId,
};
use sge_core::domain::request::{
    DocumentRequest, DocumentRequestId, DocumentType, RequestFilter, RequestStatus,
};
use sge_core::domain::user::UserId;
use sge_core::errors::ApplicationError;
use sge_core::status::{Badge, StatusBadge};

use crate::gateway::DocumentGateway;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestRow {
    pub id: DocumentRequestId,
    pub document_type: DocumentType,
    pub academic_year: String,
    pub requester: UserId,
    pub status: RequestStatus,
    pub badge: StatusBadge,
    pub approvals: ApprovalSummary,
    pub created_at: DateTime<Utc>,
}

impl From<&DocumentRequest> for RequestRow {
    fn from(request: &DocumentRequest) -> Self {
        Self {
            id: request.id.clone(),
            document_type: request.document_type,
            academic_year: request.academic_year.clone(),
            requester: request.requester.clone(),
            status: request.status,
            badge: request.status.badge(),
            approvals: request.approval_summary(),
            created_at: request.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalRow {
    pub id: TeacherApprovalId,
    pub request_id: DocumentRequestId,
    pub status: ApprovalStatus,
    pub badge: StatusBadge,
    pub created_at: DateTime<Utc>,
}

impl From<&TeacherApproval> for ApprovalRow {
    fn from(approval: &TeacherApproval) -> Self {
        Self {
            id: approval.id.clone(),
            request_id: approval.request_id.clone(),
            status: approval.status,
            badge: approval.status.badge(),
            created_at: approval.created_at,
        }
    }
}

/// Read-only list view over requests, newest first.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RequestBoard {
    rows: Vec<RequestRow>,
}

impl RequestBoard {
    pub async fn load(
        gateway: &dyn DocumentGateway,
        filter: &RequestFilter,
    ) -> Result<Self, ApplicationError> {
        let requests = gateway.list_requests(filter).await?;
        debug!(
            event_name = "board.loaded",
            backend = gateway.backend_name(),
            rows = requests.len(),
            "request board loaded"
        );
        Ok(Self::from_requests(&requests))
    }

    pub fn from_requests(requests: &[DocumentRequest]) -> Self {
        let mut rows: Vec<RequestRow> = requests.iter().map(RequestRow::from).collect();
        rows.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.cmp(&left.id))
        });
        Self { rows }
    }

    pub fn rows(&self) -> &[RequestRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row count per status; statuses with no rows are omitted.
    pub fn counts(&self) -> BTreeMap<RequestStatus, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.status).or_insert(0) += 1;
        }
        counts
    }
}

pub fn approval_rows(approvals: &[TeacherApproval]) -> Vec<ApprovalRow> {
    approvals.iter().map(ApprovalRow::from).collect()
}

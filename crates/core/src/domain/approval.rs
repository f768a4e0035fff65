use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::DocumentRequestId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::validation::MIN_PRESENCE_TEACHERS;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherApprovalId(pub String);

impl fmt::Display for TeacherApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target status a teacher may set on a pending approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => Self::Approved,
            ApprovalDecision::Rejected => Self::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherApproval {
    pub id: TeacherApprovalId,
    pub request_id: DocumentRequestId,
    pub teacher: UserId,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl TeacherApproval {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn decide(
        &mut self,
        decision: ApprovalDecision,
        decided_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::ApprovalAlreadyDecided {
                approval_id: self.id.clone(),
                status: self.status,
            });
        }

        self.status = decision.into();
        self.decided_at = Some(decided_at);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

impl ApprovalSummary {
    pub fn from_approvals(approvals: &[TeacherApproval]) -> Self {
        approvals.iter().fold(Self::default(), |mut summary, approval| {
            summary.total += 1;
            match approval.status {
                ApprovalStatus::Pending => summary.pending += 1,
                ApprovalStatus::Approved => summary.approved += 1,
                ApprovalStatus::Rejected => summary.rejected += 1,
            }
            summary
        })
    }

    /// Every approval granted. Vacuously true when there are none.
    pub fn is_complete(&self) -> bool {
        self.approved == self.total
    }

    pub fn is_blocked(&self) -> bool {
        self.rejected > 0
    }

    /// A presence certificate needs at least the minimum teacher selection,
    /// all of it approved. An empty or truncated list never satisfies the gate.
    pub fn grants_presence(&self) -> bool {
        self.total >= MIN_PRESENCE_TEACHERS && self.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::request::DocumentRequestId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    use super::{
        ApprovalDecision, ApprovalStatus, ApprovalSummary, TeacherApproval, TeacherApprovalId,
    };

    fn approval(id: &str, status: ApprovalStatus) -> TeacherApproval {
        TeacherApproval {
            id: TeacherApprovalId(id.to_string()),
            request_id: DocumentRequestId("REQ-1".to_string()),
            teacher: UserId("tch-001".to_string()),
            status,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn pending_approval_is_decided_once() {
        let mut approval = approval("APR-1", ApprovalStatus::Pending);
        approval.decide(ApprovalDecision::Approved, Utc::now()).expect("first decision");
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert!(approval.decided_at.is_some());

        let error = approval
            .decide(ApprovalDecision::Rejected, Utc::now())
            .expect_err("second decision must be refused");
        assert!(matches!(
            error,
            DomainError::ApprovalAlreadyDecided { status: ApprovalStatus::Approved, .. }
        ));
    }

    #[test]
    fn summary_is_complete_only_when_everyone_approved() {
        let approvals = vec![
            approval("APR-1", ApprovalStatus::Approved),
            approval("APR-2", ApprovalStatus::Approved),
            approval("APR-3", ApprovalStatus::Pending),
        ];
        let summary = ApprovalSummary::from_approvals(&approvals);
        assert_eq!(summary, ApprovalSummary { total: 3, approved: 2, rejected: 0, pending: 1 });
        assert!(!summary.is_complete());
        assert!(!summary.is_blocked());

        let empty = ApprovalSummary::from_approvals(&[]);
        assert!(empty.is_complete());
    }

    #[test]
    fn presence_gate_needs_the_minimum_selection_fully_approved() {
        assert!(!ApprovalSummary::from_approvals(&[]).grants_presence());

        let lone = vec![approval("APR-1", ApprovalStatus::Approved)];
        assert!(!ApprovalSummary::from_approvals(&lone).grants_presence());

        let pair = vec![
            approval("APR-1", ApprovalStatus::Approved),
            approval("APR-2", ApprovalStatus::Approved),
        ];
        assert!(ApprovalSummary::from_approvals(&pair).grants_presence());
    }

    #[test]
    fn single_rejection_blocks() {
        let approvals = vec![
            approval("APR-1", ApprovalStatus::Approved),
            approval("APR-2", ApprovalStatus::Rejected),
        ];
        let summary = ApprovalSummary::from_approvals(&approvals);
        assert!(summary.is_blocked());
        assert!(!summary.is_complete());
    }
}

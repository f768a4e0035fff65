use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalSummary, TeacherApproval};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRequestId(pub String);

impl fmt::Display for DocumentRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Transcript,
    CertificatePresence,
    CertificateSuccess,
    CertificateInscription,
    Diploma,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        Self::Transcript,
        Self::CertificatePresence,
        Self::CertificateSuccess,
        Self::CertificateInscription,
        Self::Diploma,
        Self::Other,
    ];

    /// Types for which staff generate an official certificate during fulfillment.
    pub fn is_certificate(self) -> bool {
        matches!(
            self,
            Self::CertificateInscription | Self::CertificatePresence | Self::CertificateSuccess
        )
    }

    pub fn requires_teacher_approvals(self) -> bool {
        self == Self::CertificatePresence
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "TRANSCRIPT",
            Self::CertificatePresence => "CERTIFICATE_PRESENCE",
            Self::CertificateSuccess => "CERTIFICATE_SUCCESS",
            Self::CertificateInscription => "CERTIFICATE_INSCRIPTION",
            Self::Diploma => "DIPLOMA",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == key)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "document type",
                value: value.trim().to_owned(),
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fr,
    Ar,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::Ar => "ar",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fr" => Ok(Self::Fr),
            "ar" => Ok(Self::Ar),
            other => Err(DomainError::UnknownValue { kind: "language", value: other.to_owned() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceptionType {
    Online,
    Personal,
    Both,
}

impl std::str::FromStr for ReceptionType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "personal" => Ok(Self::Personal),
            "both" => Ok(Self::Both),
            other => {
                Err(DomainError::UnknownValue { kind: "reception type", value: other.to_owned() })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    New,
    InProgress,
    Ready,
    Rejected,
    Delivered,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] =
        [Self::New, Self::InProgress, Self::Ready, Self::Rejected, Self::Delivered];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Delivered)
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::InProgress)
                | (Self::New, Self::Ready)
                | (Self::New, Self::Rejected)
                | (Self::InProgress, Self::Ready)
                | (Self::InProgress, Self::Rejected)
                | (Self::Ready, Self::Delivered)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Ready => "READY",
            Self::Rejected => "REJECTED",
            Self::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == key).ok_or_else(|| {
            DomainError::UnknownValue { kind: "request status", value: value.trim().to_owned() }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub old_status: RequestStatus,
    pub new_status: RequestStatus,
    pub actor: String,
    pub comment: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub id: DocumentRequestId,
    pub document_type: DocumentType,
    pub language: Language,
    pub reception_type: ReceptionType,
    pub academic_year: String,
    pub status: RequestStatus,
    pub requester: UserId,
    #[serde(default)]
    pub additional_info: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    #[serde(default)]
    pub presence_approvals: Vec<TeacherApproval>,
}

impl DocumentRequest {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Moves the request to `next` and appends the change to its history.
    pub fn transition_to(
        &mut self,
        next: RequestStatus,
        actor: impl Into<String>,
        comment: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Result<&StatusChange, DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition { from: self.status, to: next });
        }

        self.history.push(StatusChange {
            old_status: self.status,
            new_status: next,
            actor: actor.into(),
            comment,
            changed_at,
        });
        self.status = next;

        self.history.last().ok_or_else(|| {
            DomainError::InvariantViolation("status history is empty after a transition".into())
        })
    }

    pub fn approval_summary(&self) -> ApprovalSummary {
        ApprovalSummary::from_approvals(&self.presence_approvals)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub document_type: Option<DocumentType>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &DocumentRequest) -> bool {
        self.document_type.map_or(true, |document_type| request.document_type == document_type)
            && self.status.map_or(true, |status| request.status == status)
    }
}

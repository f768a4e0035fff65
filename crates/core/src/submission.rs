use serde::{Deserialize, Serialize};

use crate::domain::request::{DocumentType, Language, ReceptionType};
use crate::domain::user::UserId;
use crate::validation::{require_text, validate_teacher_selection, ValidationError};

/// Form input as collected from a requester, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub document_type: DocumentType,
    pub language: Language,
    pub reception_type: ReceptionType,
    pub academic_year: String,
    #[serde(default)]
    pub additional_info: Option<String>,
    #[serde(default)]
    pub teachers: Vec<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub document_type: DocumentType,
    pub language: Language,
    pub reception_type: ReceptionType,
    pub academic_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPresenceRequest {
    pub language: Language,
    pub reception_type: ReceptionType,
    pub academic_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    pub teachers: Vec<UserId>,
}

/// A validated draft, routed to the collaborator operation it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    Standard(NewRequest),
    Presence(NewPresenceRequest),
}

impl RequestDraft {
    pub fn validate(self) -> Result<Submission, ValidationError> {
        require_text("academic_year", &self.academic_year)?;

        let academic_year = self.academic_year.trim().to_owned();
        let additional_info = self
            .additional_info
            .map(|info| info.trim().to_owned())
            .filter(|info| !info.is_empty());

        if self.document_type.requires_teacher_approvals() {
            validate_teacher_selection(&self.teachers)?;
            return Ok(Submission::Presence(NewPresenceRequest {
                language: self.language,
                reception_type: self.reception_type,
                academic_year,
                additional_info,
                teachers: self.teachers,
            }));
        }

        if !self.teachers.is_empty() {
            return Err(ValidationError::TeachersNotAccepted(self.document_type));
        }

        Ok(Submission::Standard(NewRequest {
            document_type: self.document_type,
            language: self.language,
            reception_type: self.reception_type,
            academic_year,
            additional_info,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{DocumentType, Language, ReceptionType};
    use crate::domain::user::UserId;
    use crate::validation::ValidationError;

    use super::{RequestDraft, Submission};

    fn draft(document_type: DocumentType, teachers: &[&str]) -> RequestDraft {
        RequestDraft {
            document_type,
            language: Language::Fr,
            reception_type: ReceptionType::Online,
            academic_year: " 2025-2026 ".to_string(),
            additional_info: Some("   ".to_string()),
            teachers: teachers.iter().map(|id| UserId((*id).to_string())).collect(),
        }
    }

    #[test]
    fn standard_draft_becomes_plain_request() {
        let submission = draft(DocumentType::Transcript, &[]).validate().expect("valid draft");
        let Submission::Standard(request) = submission else {
            panic!("transcript must not go through the presence path");
        };
        assert_eq!(request.academic_year, "2025-2026");
        assert_eq!(request.additional_info, None);
    }

    #[test]
    fn presence_draft_carries_teachers() {
        let submission = draft(DocumentType::CertificatePresence, &["tch-001", "tch-002", "tch-003"])
            .validate()
            .expect("three teachers");
        let Submission::Presence(request) = submission else {
            panic!("presence certificate must use the presence path");
        };
        assert_eq!(request.teachers.len(), 3);
    }

    #[test]
    fn presence_draft_with_one_teacher_is_refused() {
        let error = draft(DocumentType::CertificatePresence, &["tch-001"])
            .validate()
            .expect_err("one teacher is not enough");
        assert_eq!(error, ValidationError::TooFewTeachers { selected: 1, minimum: 2 });
    }

    #[test]
    fn blank_academic_year_is_refused() {
        let mut draft = draft(DocumentType::Diploma, &[]);
        draft.academic_year = "   ".to_string();
        assert_eq!(draft.validate(), Err(ValidationError::MissingField("academic_year")));
    }

    #[test]
    fn teachers_on_non_presence_type_are_refused() {
        let error = draft(DocumentType::CertificateSuccess, &["tch-001", "tch-002"])
            .validate()
            .expect_err("teachers only apply to presence certificates");
        assert_eq!(error, ValidationError::TeachersNotAccepted(DocumentType::CertificateSuccess));
    }
}

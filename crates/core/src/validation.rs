use std::collections::HashSet;

use thiserror::Error;

use crate::domain::request::DocumentType;
use crate::domain::user::UserId;

pub const MIN_PRESENCE_TEACHERS: usize = 2;
pub const MAX_PRESENCE_TEACHERS: usize = 5;
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Failures detected before any collaborator call is issued.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("select at least {minimum} teachers")]
    TooFewTeachers { selected: usize, minimum: usize },
    #[error("select at most {maximum} teachers")]
    TooManyTeachers { selected: usize, maximum: usize },
    #[error("teacher {0} was selected more than once")]
    DuplicateTeacher(UserId),
    #[error("teachers can only be selected for presence certificates, not {0}")]
    TeachersNotAccepted(DocumentType),
    #[error("only PDF files are accepted (got `{content_type}`)")]
    UnsupportedFileType { content_type: String },
    #[error("file is too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("file is empty")]
    EmptyFile,
}

pub fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

pub fn validate_teacher_selection(teachers: &[UserId]) -> Result<(), ValidationError> {
    if teachers.len() < MIN_PRESENCE_TEACHERS {
        return Err(ValidationError::TooFewTeachers {
            selected: teachers.len(),
            minimum: MIN_PRESENCE_TEACHERS,
        });
    }
    if teachers.len() > MAX_PRESENCE_TEACHERS {
        return Err(ValidationError::TooManyTeachers {
            selected: teachers.len(),
            maximum: MAX_PRESENCE_TEACHERS,
        });
    }

    let mut seen = HashSet::with_capacity(teachers.len());
    for teacher in teachers {
        if !seen.insert(teacher) {
            return Err(ValidationError::DuplicateTeacher(teacher.clone()));
        }
    }

    Ok(())
}

/// Checks an upload against the PDF-only rule and the byte limit.
///
/// `limit` is clamped to [`MAX_UPLOAD_BYTES`]; configuration may tighten the
/// bound but never loosen it.
pub fn validate_pdf_upload(
    content_type: &str,
    size: u64,
    limit: u64,
) -> Result<(), ValidationError> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
        return Err(ValidationError::UnsupportedFileType { content_type: content_type.to_owned() });
    }

    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }

    let limit = limit.min(MAX_UPLOAD_BYTES);
    if size > limit {
        return Err(ValidationError::FileTooLarge { size, limit });
    }

    Ok(())
}

use crate::domain::request::{DocumentRequestId, DocumentType, Language};
use crate::validation::{validate_pdf_upload, ValidationError, PDF_CONTENT_TYPE};

/// A PDF handed back by the collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdfDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn request_pdf(request_id: &DocumentRequestId, bytes: Vec<u8>) -> Self {
        Self { file_name: format!("demande_{request_id}.pdf"), bytes }
    }

    pub fn certificate(
        request_id: &DocumentRequestId,
        document_type: DocumentType,
        language: Language,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: format!(
                "{}_{request_id}_{}.pdf",
                document_type.as_str().to_ascii_lowercase(),
                language.as_str()
            ),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The signed document staff upload in step 3. Only constructible once the
/// file passes the PDF and size checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfficialDocument {
    file_name: String,
    bytes: Vec<u8>,
}

impl OfficialDocument {
    pub fn new(
        file_name: impl Into<String>,
        content_type: &str,
        bytes: Vec<u8>,
        limit: u64,
    ) -> Result<Self, ValidationError> {
        validate_pdf_upload(content_type, bytes.len() as u64, limit)?;
        Ok(Self { file_name: file_name.into(), bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{DocumentRequestId, DocumentType, Language};
    use crate::validation::{ValidationError, MAX_UPLOAD_BYTES};

    use super::{OfficialDocument, PdfDocument};

    #[test]
    fn certificate_file_name_carries_type_and_language() {
        let pdf = PdfDocument::certificate(
            &DocumentRequestId("REQ-0002".into()),
            DocumentType::CertificatePresence,
            Language::Ar,
            b"%PDF-1.4".to_vec(),
        );
        assert_eq!(pdf.file_name, "certificate_presence_REQ-0002_ar.pdf");
    }

    #[test]
    fn oversized_upload_cannot_be_built() {
        let bytes = vec![0_u8; 12 * 1024 * 1024];
        let error = OfficialDocument::new("signed.pdf", "application/pdf", bytes, MAX_UPLOAD_BYTES)
            .expect_err("12 MB is over the limit");
        assert!(matches!(error, ValidationError::FileTooLarge { .. }));
    }

    #[test]
    fn non_pdf_upload_cannot_be_built() {
        let error = OfficialDocument::new("scan.png", "image/png", vec![1, 2, 3], MAX_UPLOAD_BYTES)
            .expect_err("png is refused");
        assert!(matches!(error, ValidationError::UnsupportedFileType { .. }));
    }
}

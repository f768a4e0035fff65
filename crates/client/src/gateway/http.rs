use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sge_core::config::BackendConfig;
use sge_core::domain::approval::{ApprovalDecision, TeacherApproval, TeacherApprovalId};
use sge_core::domain::request::{
    DocumentRequest, DocumentRequestId, DocumentType, Language, RequestFilter, RequestStatus,
};
use sge_core::documents::{OfficialDocument, PdfDocument};
use sge_core::submission::{NewPresenceRequest, NewRequest};

use super::{DocumentGateway, GatewayError};

/// REST client for the document-management API.
pub struct HttpDocumentGateway {
    client: Client,
    base_url: Url,
    api_token: SecretString,
}

#[derive(Serialize)]
struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    document_type: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<RequestStatus>,
}

#[derive(Serialize)]
struct CertificateQuery {
    document_type: DocumentType,
    lang: Language,
}

#[derive(Serialize)]
struct ApprovalUpdate {
    status: ApprovalDecision,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpDocumentGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sge-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        let raw = base_url.into();
        let base_url = Url::parse(raw.trim()).map_err(|error| {
            GatewayError::Configuration(format!("invalid backend.base_url `{raw}`: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Configuration(format!(
                "backend.base_url `{raw}` cannot carry a path"
            )));
        }
        Ok(Self { client, base_url, api_token })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, GatewayError> {
        let api_token = config.api_token.clone().ok_or_else(|| {
            GatewayError::Configuration("backend.api_token is not configured".to_string())
        })?;
        Self::new(&config.base_url, api_token, Duration::from_secs(config.timeout_secs))
    }

    /// Appends `segments` to the base path; each segment is percent-encoded,
    /// so ids never change which endpoint is hit.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request_url(&self, id: &DocumentRequestId, action: Option<&str>) -> Url {
        let mut segments = vec!["documents", "requests", id.0.as_str()];
        segments.extend(action);
        self.url(&segments)
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        debug!(event_name = "gateway.http.request", operation, "calling document api");

        let response =
            builder.bearer_auth(self.api_token.expose_secret()).send().await.map_err(|error| {
                warn!(
                    event_name = "gateway.http.transport_failed",
                    operation,
                    error = %error,
                    "document api call failed before a response"
                );
                GatewayError::Transport(error.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, status);
        warn!(
            event_name = "gateway.http.rejected",
            operation,
            status = status.as_u16(),
            message = %message,
            "document api rejected the call"
        );
        Err(map_status(status, message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(operation, builder).await?;
        response.json::<T>().await.map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn send_bytes(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Vec<u8>, GatewayError> {
        let response = self.send(operation, builder).await?;
        let bytes = response.bytes().await.map_err(|error| {
            if error.is_decode() {
                GatewayError::Decode(error.to_string())
            } else {
                GatewayError::Transport(error.to_string())
            }
        })?;
        Ok(bytes.to_vec())
    }
}

fn error_message(body: &str, status: StatusCode) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .filter(|message| !message.trim().is_empty());

    match parsed {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.canonical_reason().unwrap_or("unexpected status").to_string(),
    }
}

fn map_status(status: StatusCode, message: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::PermissionDenied(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::CONFLICT => GatewayError::Conflict(message),
        other => GatewayError::Rejected { status: other.as_u16(), message },
    }
}

#[async_trait]
impl DocumentGateway for HttpDocumentGateway {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DocumentRequest>, GatewayError> {
        let query = ListQuery { document_type: filter.document_type, status: filter.status };
        let builder = self.client.get(self.url(&["documents", "requests"])).query(&query);
        self.send_json("list_requests", builder).await
    }

    async fn get_request(&self, id: &DocumentRequestId) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.get(self.request_url(id, None));
        self.send_json("get_request", builder).await
    }

    async fn create_request(&self, request: &NewRequest) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.post(self.url(&["documents", "requests"])).json(request);
        self.send_json("create_request", builder).await
    }

    async fn create_presence_request(
        &self,
        request: &NewPresenceRequest,
    ) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.post(self.url(&["documents", "requests", "presence"])).json(request);
        self.send_json("create_presence_request", builder).await
    }

    async fn terminate_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.post(self.request_url(id, Some("terminate")));
        self.send_json("terminate_request", builder).await
    }

    async fn reject_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.post(self.request_url(id, Some("reject")));
        self.send_json("reject_request", builder).await
    }

    async fn deliver_request(
        &self,
        id: &DocumentRequestId,
    ) -> Result<DocumentRequest, GatewayError> {
        let builder = self.client.post(self.request_url(id, Some("deliver")));
        self.send_json("deliver_request", builder).await
    }

    async fn download_request_pdf(
        &self,
        id: &DocumentRequestId,
    ) -> Result<PdfDocument, GatewayError> {
        let builder = self.client.get(self.request_url(id, Some("pdf")));
        let bytes = self.send_bytes("download_request_pdf", builder).await?;
        Ok(PdfDocument::request_pdf(id, bytes))
    }

    async fn generate_certificate(
        &self,
        id: &DocumentRequestId,
        document_type: DocumentType,
        language: Language,
    ) -> Result<PdfDocument, GatewayError> {
        let builder = self
            .client
            .get(self.request_url(id, Some("certificate")))
            .query(&CertificateQuery { document_type, lang: language });
        let bytes = self.send_bytes("generate_certificate", builder).await?;
        Ok(PdfDocument::certificate(id, document_type, language, bytes))
    }

    async fn upload_official_document(
        &self,
        id: &DocumentRequestId,
        document: &OfficialDocument,
    ) -> Result<(), GatewayError> {
        let part = multipart::Part::bytes(document.bytes().to_vec())
            .file_name(document.file_name().to_string())
            .mime_str(document.content_type())
            .map_err(|error| GatewayError::Transport(error.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let url = self.request_url(id, Some("upload"));
        let builder = self.client.post(url).multipart(form);
        self.send("upload_official_document", builder).await?;
        Ok(())
    }

    async fn list_teacher_approvals(&self) -> Result<Vec<TeacherApproval>, GatewayError> {
        let builder = self.client.get(self.url(&["documents", "approvals", "mine"]));
        self.send_json("list_teacher_approvals", builder).await
    }

    async fn update_approval(
        &self,
        id: &TeacherApprovalId,
        decision: ApprovalDecision,
    ) -> Result<TeacherApproval, GatewayError> {
        let builder = self
            .client
            .patch(self.url(&["documents", "approvals", id.0.as_str()]))
            .json(&ApprovalUpdate { status: decision });
        self.send_json("update_approval", builder).await
    }
}

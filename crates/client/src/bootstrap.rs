use std::sync::Arc;

use tracing::info;

use sge_core::config::{AppConfig, BackendKind};
use sge_core::errors::ApplicationError;

use crate::gateway::{DocumentGateway, HttpDocumentGateway, InMemoryDocumentGateway};

/// Builds the collaborator selected by `backend.kind`.
pub fn connect(config: &AppConfig) -> Result<Arc<dyn DocumentGateway>, ApplicationError> {
    let session = config.session();
    let gateway: Arc<dyn DocumentGateway> = match config.backend.kind {
        BackendKind::Memory => Arc::new(
            InMemoryDocumentGateway::seeded(session.clone())
                .with_upload_limit(config.upload.max_bytes),
        ),
        BackendKind::Http => Arc::new(HttpDocumentGateway::from_config(&config.backend)?),
    };

    info!(
        event_name = "system.gateway.connected",
        correlation_id = "bootstrap",
        backend = gateway.backend_name(),
        actor = %session.user_id,
        role = session.role.as_str(),
        "document gateway ready"
    );
    Ok(gateway)
}

use serde_json::json;
use tracing::info;

use sge_client::RequestBoard;
use sge_core::domain::request::{DocumentRequestId, RequestFilter};
use sge_core::errors::ApplicationError;
use sge_core::status::Badge;

use crate::commands::{block_on, CommandResult, Workspace};

pub fn list(workspace: &Workspace, filter: RequestFilter) -> CommandResult {
    let outcome = block_on("requests", async {
        RequestBoard::load(workspace.gateway.as_ref(), &filter).await
    });

    match outcome {
        Ok(Ok(board)) => {
            let message = if board.is_empty() {
                "no requests match the filter".to_string()
            } else {
                format!("{} request(s)", board.rows().len())
            };
            CommandResult::success_with_data(
                "requests",
                message,
                json!({ "rows": board.rows(), "counts": board.counts() }),
            )
        }
        Ok(Err(error)) => CommandResult::from_application_error("requests", error),
        Err(failure) => failure,
    }
}

pub fn show(workspace: &Workspace, id: String) -> CommandResult {
    let id = DocumentRequestId(id);
    let outcome = block_on("requests", async {
        workspace.gateway.get_request(&id).await.map_err(ApplicationError::from)
    });

    match outcome {
        Ok(Ok(request)) => CommandResult::success_with_data(
            "requests",
            format!("request {} is {}", request.id, request.status),
            json!({
                "request": &request,
                "badge": request.status.badge(),
                "approvals": request.approval_summary(),
            }),
        ),
        Ok(Err(error)) => CommandResult::from_application_error("requests", error),
        Err(failure) => failure,
    }
}

/// Hands a READY request over to its requester.
pub fn deliver(workspace: &Workspace, id: String) -> CommandResult {
    let id = DocumentRequestId(id);
    let session = workspace.config.session();
    let outcome = block_on("requests", async {
        workspace.gateway.deliver_request(&id).await.map_err(ApplicationError::from)
    });

    match outcome {
        Ok(Ok(request)) => {
            info!(
                event_name = "request.delivered",
                correlation_id = "cli-requests",
                request_id = %request.id,
                actor = %session.user_id,
                "request delivered"
            );
            CommandResult::success_with_data(
                "requests",
                format!("request {} delivered", request.id),
                json!({ "request": &request, "badge": request.status.badge() }),
            )
        }
        Ok(Err(error)) => CommandResult::from_application_error("requests", error),
        Err(failure) => failure,
    }
}

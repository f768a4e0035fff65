use serde_json::json;

use sge_client::RequestSubmitter;
use sge_core::status::Badge;
use sge_core::submission::RequestDraft;

use crate::commands::{block_on, CommandResult, Workspace};

pub fn run(workspace: &Workspace, draft: RequestDraft) -> CommandResult {
    let submitter = RequestSubmitter::new(workspace.gateway.clone(), workspace.config.session());
    let outcome = block_on("submit", submitter.submit(draft));

    match outcome {
        Ok(Ok(request)) => CommandResult::success_with_data(
            "submit",
            format!("request {} submitted", request.id),
            json!({
                "request": &request,
                "badge": request.status.badge(),
                "approvals": request.approval_summary(),
            }),
        ),
        Ok(Err(error)) => CommandResult::from_application_error("submit", error),
        Err(failure) => failure,
    }
}

use serde_json::json;

use sge_client::services::approval_rows;
use sge_client::ApprovalDesk;
use sge_core::domain::approval::{ApprovalDecision, TeacherApprovalId};
use sge_core::errors::ApplicationError;
use sge_core::status::Badge;

use crate::commands::{block_on, CommandResult, Workspace};

pub fn list(workspace: &Workspace) -> CommandResult {
    let mut desk = ApprovalDesk::new(workspace.gateway.clone(), workspace.config.session());
    let outcome = block_on("approvals", async {
        desk.refresh().await?;
        Ok::<_, ApplicationError>(approval_rows(desk.approvals()))
    });

    match outcome {
        Ok(Ok(rows)) => {
            let pending = desk.pending().len();
            CommandResult::success_with_data(
                "approvals",
                format!("{} approval task(s), {pending} pending", rows.len()),
                json!({ "rows": rows, "pending": pending }),
            )
        }
        Ok(Err(error)) => CommandResult::from_application_error("approvals", error),
        Err(failure) => failure,
    }
}

pub fn decide(workspace: &Workspace, id: String, decision: ApprovalDecision) -> CommandResult {
    let id = TeacherApprovalId(id);
    let mut desk = ApprovalDesk::new(workspace.gateway.clone(), workspace.config.session());
    let outcome = block_on("approvals", async {
        desk.refresh().await?;
        desk.decide(&id, decision).await
    });

    match outcome {
        Ok(Ok(approval)) => CommandResult::success_with_data(
            "approvals",
            format!("approval {} is now {}", approval.id, approval.status),
            json!({ "approval": &approval, "badge": approval.status.badge() }),
        ),
        Ok(Err(error)) => CommandResult::from_application_error("approvals", error),
        Err(failure) => failure,
    }
}

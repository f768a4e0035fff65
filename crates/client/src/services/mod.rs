//! Coordinators that sequence collaborator calls for each actor.

use uuid::Uuid;

pub mod approvals;
pub mod board;
pub mod fulfillment;
pub mod submission;

pub use approvals::ApprovalDesk;
pub use board::{approval_rows, ApprovalRow, RequestBoard, RequestRow};
pub use fulfillment::{FulfillmentOptions, FulfillmentSession};
pub use submission::RequestSubmitter;

pub(crate) fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

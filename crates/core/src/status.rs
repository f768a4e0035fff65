use serde::Serialize;

use crate::domain::approval::ApprovalStatus;
use crate::domain::request::RequestStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeColor {
    Blue,
    Orange,
    Green,
    Red,
    Gray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: &'static str,
    pub color: BadgeColor,
}

pub trait Badge {
    fn badge(&self) -> StatusBadge;
}

impl Badge for RequestStatus {
    fn badge(&self) -> StatusBadge {
        let (label, color) = match self {
            Self::New => ("New", BadgeColor::Blue),
            Self::InProgress => ("In progress", BadgeColor::Orange),
            Self::Ready => ("Ready", BadgeColor::Green),
            Self::Rejected => ("Rejected", BadgeColor::Red),
            Self::Delivered => ("Delivered", BadgeColor::Gray),
        };
        StatusBadge { label, color }
    }
}

impl Badge for ApprovalStatus {
    fn badge(&self) -> StatusBadge {
        let (label, color) = match self {
            Self::Pending => ("Pending", BadgeColor::Orange),
            Self::Approved => ("Approved", BadgeColor::Green),
            Self::Rejected => ("Rejected", BadgeColor::Red),
        };
        StatusBadge { label, color }
    }
}

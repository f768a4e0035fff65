use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Administrator,
    ScolarAdministrator,
    ClubManager,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Administrator | Self::ScolarAdministrator)
    }

    /// Students and teachers may file document requests.
    pub fn can_request_documents(self) -> bool {
        matches!(self, Self::Student | Self::Teacher)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Administrator => "administrator",
            Self::ScolarAdministrator => "scolar_administrator",
            Self::ClubManager => "club_manager",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "administrator" | "admin" => Ok(Self::Administrator),
            "scolar_administrator" | "scolar_admin" => Ok(Self::ScolarAdministrator),
            "club_manager" => Ok(Self::ClubManager),
            other => Err(DomainError::UnknownValue { kind: "role", value: other.to_owned() }),
        }
    }
}

/// The authenticated actor on whose behalf collaborator calls are made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self { user_id: UserId(user_id.into()), role }
    }
}

//! Invitation types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use super::{GroupId, InvitationId, ProfileId};

/// Invitation lifecycle. `Accepted` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Error type for parsing InvitationStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInvitationStatusError(pub String);

impl std::fmt::Display for ParseInvitationStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid invitation status: {}", self.0)
    }
}

impl std::error::Error for ParseInvitationStatusError {}

impl FromStr for InvitationStatus {
    type Err = ParseInvitationStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "rejected" => Ok(InvitationStatus::Rejected),
            _ => Err(ParseInvitationStatusError(s.to_string())),
        }
    }
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

/// Invitation record
#[derive(Clone, Debug, Serialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub group_id: GroupId,
    pub invited_profile_id: ProfileId,
    pub invited_by_profile_id: ProfileId,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating an invitation
#[derive(Clone, Debug)]
pub struct CreateInvitationParams {
    pub group_id: GroupId,
    pub invited_profile_id: ProfileId,
    pub invited_by_profile_id: ProfileId,
}

//! Group and membership types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use super::{GroupId, ProfileId};

/// Group record
#[derive(Clone, Debug, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Denormalized count of memberships; kept in step by the store.
    pub total_members: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role a profile holds inside a group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

/// Error type for parsing MemberRole from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMemberRoleError(pub String);

impl std::fmt::Display for ParseMemberRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid member role: {}", self.0)
    }
}

impl std::error::Error for ParseMemberRoleError {}

impl FromStr for MemberRole {
    type Err = ParseMemberRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            _ => Err(ParseMemberRoleError(s.to_string())),
        }
    }
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

/// Group membership record
#[derive(Clone, Debug, Serialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub profile_id: ProfileId,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a group together with its first admin
#[derive(Clone, Debug)]
pub struct CreateGroupParams {
    pub name: String,
    pub creator: ProfileId,
}

//! Profile types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ProfileId;

/// Profile record
#[derive(Clone, Debug, Serialize)]
pub struct Profile {
    pub id: ProfileId,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a profile
#[derive(Clone, Debug)]
pub struct CreateProfileParams {
    pub email: String,
    pub name: String,
}

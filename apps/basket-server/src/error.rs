//! Service errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use basket_storage::{GeoPointError, StoreError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not a member of this group")]
    AccessDenied,
    #[error("only group admins can do this")]
    NotAdmin,
    #[error("not found")]
    NotFound,
    #[error("user is already a member of this group")]
    AlreadyMember,
    #[error("an invitation is already pending for this user")]
    InvitationPending,
    #[error("invitation has already been processed")]
    AlreadyProcessed,
    #[error("{0}")]
    InvalidState(String),
    #[error("no user with that email")]
    UnknownUser,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::InvalidState(msg.into())
    }

    /// Stable machine-readable code returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::AccessDenied => "access_denied",
            ServiceError::NotAdmin => "not_admin",
            ServiceError::NotFound => "not_found",
            ServiceError::AlreadyMember => "already_member",
            ServiceError::InvitationPending => "invitation_pending",
            ServiceError::AlreadyProcessed => "already_processed",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::UnknownUser => "unknown_user",
            ServiceError::Storage(e) if e.is_transient() => "unavailable",
            ServiceError::Storage(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::AccessDenied | ServiceError::NotAdmin => StatusCode::FORBIDDEN,
            ServiceError::NotFound | ServiceError::UnknownUser => StatusCode::NOT_FOUND,
            ServiceError::AlreadyMember
            | ServiceError::InvitationPending
            | ServiceError::AlreadyProcessed => StatusCode::CONFLICT,
            ServiceError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GeoPointError> for ServiceError {
    fn from(e: GeoPointError) -> Self {
        ServiceError::InvalidState(e.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Backend details stay in the logs.
            ServiceError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "storage failure".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ServiceError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotAdmin.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::UnknownUser.status(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::AlreadyProcessed.status(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::invalid("current exceeds quantity").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("pool timed out".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::from(StoreError::Backend("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::InvitationPending.code(), "invitation_pending");
        assert_eq!(ServiceError::AlreadyMember.code(), "already_member");
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("x".into())).code(),
            "unavailable"
        );
    }

    #[test]
    fn half_location_is_invalid_state() {
        let err = ServiceError::from(GeoPointError::HalfSpecified);
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(err.to_string().contains("latitude and longitude"));
    }
}

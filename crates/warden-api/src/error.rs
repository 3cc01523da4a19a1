//! Maps every subsystem error this crate can observe onto the §6 error
//! envelope's `kind` taxonomy. Handlers propagate with `?`; this is the one
//! place that decides what a client is told.

use axum::response::{IntoResponse, Response};
use warden_types::ErrorKind;

use crate::envelope::error_envelope;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("login required")]
    LoginRequired,
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no services named and no default services configured")]
    NoDefaultServices,
    #[error("{0}")]
    Generic(String),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::LoginRequired => ErrorKind::LoginRequired,
            ApiError::PermissionDenied => ErrorKind::PermissionDenied,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::NoDefaultServices => ErrorKind::NoDefaultServices,
            ApiError::Generic(_) => ErrorKind::Generic,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        error_envelope(self.kind(), message).into_response()
    }
}

impl From<warden_store::StoreError> for ApiError {
    fn from(err: warden_store::StoreError) -> Self {
        match err {
            warden_store::StoreError::ChangeNotFound(id) => ApiError::NotFound(id.to_string()),
            warden_store::StoreError::TaskNotFound(id) => ApiError::NotFound(id.to_string()),
            warden_store::StoreError::NoticeNotFound(id) => ApiError::NotFound(id.to_string()),
            other => ApiError::Generic(other.to_string()),
        }
    }
}

impl From<warden_supervisor::SupervisorError> for ApiError {
    fn from(err: warden_supervisor::SupervisorError) -> Self {
        match err {
            warden_supervisor::SupervisorError::UnknownService(name) => ApiError::NotFound(name.to_string()),
            other => ApiError::Generic(other.to_string()),
        }
    }
}

impl From<warden_checks::CheckError> for ApiError {
    fn from(err: warden_checks::CheckError) -> Self {
        match err {
            warden_checks::CheckError::UnknownCheck(name) => ApiError::NotFound(name.to_string()),
        }
    }
}

impl From<warden_overlord::OverlordError> for ApiError {
    fn from(err: warden_overlord::OverlordError) -> Self {
        ApiError::Generic(err.to_string())
    }
}

impl From<warden_plan::PlanError> for ApiError {
    fn from(err: warden_plan::PlanError) -> Self {
        ApiError::Generic(err.to_string())
    }
}

impl From<serde_yaml::Error> for ApiError {
    fn from(err: serde_yaml::Error) -> Self {
        ApiError::Generic(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Generic(err.to_string())
    }
}

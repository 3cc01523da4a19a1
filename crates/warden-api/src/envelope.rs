//! Response envelope (§6): `{type, status-code, result, change?,
//! maintenance?}`. Every handler returns one of these three shapes rather
//! than a bare JSON body, so the envelope's `type` tag always tells a
//! client how to read `result`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use warden_types::ErrorKind;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope<T: Serialize> {
    Sync {
        #[serde(rename = "status-code")]
        status_code: u16,
        result: T,
        #[serde(skip_serializing_if = "Option::is_none")]
        maintenance: Option<serde_json::Value>,
    },
    Async {
        #[serde(rename = "status-code")]
        status_code: u16,
        change: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        maintenance: Option<serde_json::Value>,
    },
    Error {
        #[serde(rename = "status-code")]
        status_code: u16,
        result: ErrorBody,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn sync(status: StatusCode, result: T) -> Self {
        Envelope::Sync {
            status_code: status.as_u16(),
            result,
            maintenance: None,
        }
    }

    pub fn ok(result: T) -> Self {
        Self::sync(StatusCode::OK, result)
    }
}

impl Envelope<()> {
    pub fn change(id: impl std::fmt::Display) -> Self {
        Envelope::Async {
            status_code: StatusCode::ACCEPTED.as_u16(),
            change: id.to_string(),
            maintenance: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = match &self {
            Envelope::Sync { status_code, .. } | Envelope::Async { status_code, .. } | Envelope::Error { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        (status, Json(self)).into_response()
    }
}

pub fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::LoginRequired => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NoDefaultServices | ErrorKind::Generic => StatusCode::BAD_REQUEST,
        ErrorKind::SystemRestart => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn error_envelope(kind: ErrorKind, message: impl Into<String>) -> Envelope<()> {
    let status = error_status(kind);
    Envelope::Error {
        status_code: status.as_u16(),
        result: ErrorBody { kind, message: message.into() },
    }
}

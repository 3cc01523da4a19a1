//! `GET /v1/notices`, `GET /v1/notices/{id}`, `POST /v1/notices` (§6): list,
//! fetch, and client-raised notices.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use warden_store::Notice;
use warden_types::{AccessLevel, NoticeId, NoticeType};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>) -> Result<Envelope<Vec<Notice>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    Ok(Envelope::ok(state.store.list_notices()))
}

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(id): Path<NoticeId>) -> Result<Envelope<Notice>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let notice = state
        .store
        .list_notices()
        .into_iter()
        .find(|n| n.id == id)
        .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
    Ok(Envelope::ok(notice))
}

/// A client-raised notice is always `NoticeType::Custom` (§3): the
/// `change-update`/`warning` kinds are reserved for the daemon itself.
#[derive(Debug, Deserialize)]
pub struct NoticeRequest {
    key: String,
    #[serde(rename = "repeat-after", default)]
    repeat_after_secs: Option<u64>,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<NoticeRequest>) -> Result<Envelope<()>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    let repeat_after = std::time::Duration::from_secs(body.repeat_after_secs.unwrap_or(0));
    state.store.raise_notice(NoticeType::Custom, body.key, repeat_after)?;
    Ok(Envelope::ok(()))
}

//! `GET /v1/changes`, `GET /v1/changes/{id}`, `POST /v1/changes/{id}`
//! (§6): list, fetch, and `{action: abort}`.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use warden_store::Change;
use warden_types::{AccessLevel, ChangeId};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>) -> Result<Envelope<Vec<Change>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    Ok(Envelope::ok(state.store.list_changes()))
}

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(id): Path<ChangeId>) -> Result<Envelope<Change>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let change = state.store.get_change(id).ok_or_else(|| ApiError::NotFound(id.to_string()))?;
    Ok(Envelope::ok(change))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Abort,
}

#[derive(Debug, Deserialize)]
pub struct ChangeActionRequest {
    action: Action,
}

pub async fn post(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerAccess>,
    Path(id): Path<ChangeId>,
    Json(body): Json<ChangeActionRequest>,
) -> Result<Envelope<()>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    match body.action {
        Action::Abort => state.overlord.abort(id)?,
    }
    Ok(Envelope::ok(()))
}

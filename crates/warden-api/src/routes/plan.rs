//! `GET /v1/plan?format=yaml` (§6): the flattened, combined plan.

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use serde::Deserialize;
use warden_types::AccessLevel;

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    #[serde(default)]
    format: Option<String>,
}

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Query(query): Query<PlanQuery>) -> Result<Envelope<String>, ApiError> {
    require(caller, AccessLevel::Read)?;
    match query.format.as_deref() {
        None | Some("yaml") => {}
        Some(other) => return Err(ApiError::Generic(format!("unsupported plan format: {other}"))),
    }

    let yaml = warden_plan::flatten(&state.overlord.current_plan())?;
    Ok(Envelope::ok(yaml))
}

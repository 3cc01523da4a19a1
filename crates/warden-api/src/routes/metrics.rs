//! `GET /metrics` (ambient stack, not a §6 route but served on the same
//! socket): Prometheus text exposition of [`crate::metrics::Metrics`].

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use warden_types::AccessLevel;

use crate::auth::{require, CallerAccess};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>) -> Result<Response, ApiError> {
    require(caller, AccessLevel::Metrics)?;
    state.metrics.services_total.set(state.supervisor.names().len() as i64);
    state.metrics.checks_down.set(state.checks.names().iter().filter(|name| state.checks.status(name).ok() == Some(warden_types::CheckStatus::Down)).count() as i64);
    Ok(state.metrics.render().into_response())
}

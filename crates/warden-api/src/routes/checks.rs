//! `GET /v1/checks?level=&names=` and `POST /v1/checks` (§6): status per
//! check, and `{action: start|stop, checks}`.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_types::{AccessLevel, CheckLevel, CheckName, CheckStatus};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

fn split_names(raw: &str) -> Vec<CheckName> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(CheckName::new).collect()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    level: Option<CheckLevel>,
    names: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckStatusEntry {
    name: CheckName,
    status: CheckStatus,
}

pub async fn list(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Query(query): Query<ListQuery>) -> Result<Envelope<Vec<CheckStatusEntry>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let names = match query.names {
        Some(raw) => split_names(&raw),
        None => state.checks.names(),
    };

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        if let Some(level) = query.level {
            if state.checks.level(&name)? != Some(level) {
                continue;
            }
        }
        let status = state.checks.status(&name)?;
        entries.push(CheckStatusEntry { name, status });
    }
    Ok(Envelope::ok(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Start,
    Stop,
}

#[derive(Debug, Deserialize)]
pub struct ChecksRequest {
    action: Action,
    checks: Vec<String>,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<ChecksRequest>) -> Result<Envelope<()>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    for raw in body.checks {
        let name = CheckName::new(raw);
        match &body.action {
            Action::Start => state.checks.start(&name).await?,
            Action::Stop => state.checks.stop(&name).await?,
        }
    }
    Ok(Envelope::ok(()))
}

/// `GET /v1/checks/{name}/log` (§4.5): the captured tail of an exec
/// probe's stdout/stderr. Http/tcp probes have nothing to capture, so this
/// is simply empty for them.
pub async fn log(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(name): Path<String>) -> Result<Envelope<Vec<String>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let name = CheckName::new(name);
    Ok(Envelope::ok(state.checks.log_tail(&name)?))
}

//! `GET /v1/services?names=a,b` and `POST /v1/services` (§6): status per
//! name, and `{action: autostart|start|stop|restart|replan, services}` →
//! async change id.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_types::{AccessLevel, ServiceName, ServiceState};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

fn split_names(raw: &str) -> Vec<ServiceName> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ServiceName::new).collect()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    names: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    name: ServiceName,
    status: ServiceState,
}

pub async fn list(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Query(query): Query<ListQuery>) -> Result<Envelope<Vec<ServiceStatus>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let names = match query.names {
        Some(raw) => split_names(&raw),
        None => state.supervisor.names(),
    };

    let mut statuses = Vec::with_capacity(names.len());
    for name in names {
        let status = state.supervisor.state(&name)?;
        statuses.push(ServiceStatus { name, status });
    }
    Ok(Envelope::ok(statuses))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Autostart,
    Start,
    Stop,
    Restart,
    Replan,
}

#[derive(Debug, Deserialize)]
pub struct ServicesRequest {
    action: Action,
    #[serde(default)]
    services: Vec<String>,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<ServicesRequest>) -> Result<Envelope<()>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    let names: Vec<ServiceName> = body.services.into_iter().map(ServiceName::new).collect();
    if names.is_empty() && !matches!(body.action, Action::Autostart) {
        return Err(ApiError::NoDefaultServices);
    }

    let change = match body.action {
        Action::Autostart => state.overlord.enqueue_autostart()?,
        Action::Start => state.overlord.enqueue_start(names)?,
        Action::Stop => state.overlord.enqueue_stop(names)?,
        Action::Restart => state.overlord.enqueue_restart(names)?,
        Action::Replan => state.overlord.enqueue_replan(names)?,
    };

    Ok(Envelope::change(change.id))
}

/// `GET /v1/services/{name}/log` (§C "Log ring buffer"): the captured
/// tail of a service's stdout/stderr.
pub async fn log(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(name): Path<String>) -> Result<Envelope<Vec<String>>, ApiError> {
    require(caller, AccessLevel::Read)?;
    let name = ServiceName::new(name);
    Ok(Envelope::ok(state.supervisor.log_tail(&name)?))
}

//! `GET /v1/system-info` (§6): version, boot id, health indicators.

use std::sync::Arc;

use axum::extract::{Extension, State};
use serde::Serialize;
use warden_types::{AccessLevel, CheckLevel};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    version: &'static str,
    #[serde(rename = "boot-id")]
    boot_id: String,
    alive: bool,
    ready: bool,
}

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>) -> Result<Envelope<SystemInfo>, ApiError> {
    require(caller, AccessLevel::Read)?;
    Ok(Envelope::ok(SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        boot_id: state.boot_id.clone(),
        alive: state.checks.healthy(CheckLevel::Alive),
        ready: state.checks.healthy(CheckLevel::Ready),
    }))
}

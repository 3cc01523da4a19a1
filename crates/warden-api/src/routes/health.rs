//! `GET /v1/health?level=&names=` (§6): HTTP 200 if healthy, 502 if not.

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use warden_types::{AccessLevel, CheckLevel, CheckName, CheckStatus};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    level: Option<CheckLevel>,
    names: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResult {
    healthy: bool,
}

pub async fn get(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Query(query): Query<HealthQuery>) -> Result<Envelope<HealthResult>, ApiError> {
    require(caller, AccessLevel::Metrics)?;

    let healthy = match query.names {
        Some(raw) => {
            let mut all_up = true;
            for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(CheckName::new) {
                if let Some(level) = query.level {
                    if state.checks.level(&name)? != Some(level) {
                        continue;
                    }
                }
                if state.checks.status(&name)? == CheckStatus::Down {
                    all_up = false;
                }
            }
            all_up
        }
        None => match query.level {
            Some(level) => state.checks.healthy(level),
            None => state.checks.healthy(CheckLevel::Alive) && state.checks.healthy(CheckLevel::Ready),
        },
    };

    let status = if healthy { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    Ok(Envelope::sync(status, HealthResult { healthy }))
}

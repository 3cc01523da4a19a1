//! `POST /v1/signals` (§6): `{signal, services}` → sync result, one of the
//! rare routes that mutates service runtime state directly rather than
//! going through a Change (§4.4 `signal` is delivered immediately, not
//! scheduled).

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_types::{AccessLevel, ServiceName, Signal};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignalsRequest {
    signal: String,
    services: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SignalOutcome {
    service: ServiceName,
    sent: bool,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<SignalsRequest>) -> Result<Envelope<Vec<SignalOutcome>>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    let signal: Signal = body.signal.parse().map_err(|err: warden_types::UnknownSignal| ApiError::Generic(err.to_string()))?;

    let mut outcomes = Vec::with_capacity(body.services.len());
    for raw in body.services {
        let name = ServiceName::new(raw);
        state.supervisor.signal(&name, signal).await?;
        outcomes.push(SignalOutcome { service: name, sent: true });
    }
    Ok(Envelope::ok(outcomes))
}

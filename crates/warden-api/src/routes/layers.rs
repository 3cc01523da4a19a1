//! `POST /v1/layers` (§6): `{action: add|combine, label, format: yaml,
//! layer}` → boolean. Updates the combined plan in place; picking up the
//! new specs on running services is a separate `replan` action against
//! `/v1/services` (§4.1 "addLayer" only recombines — it doesn't restart
//! anything itself).

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use serde::Deserialize;
use warden_plan::AddMode;
use warden_types::{AccessLevel, LayerLabel};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Add,
    Combine,
}

#[derive(Debug, Deserialize)]
pub struct LayersRequest {
    action: Action,
    label: String,
    #[serde(default)]
    format: Option<String>,
    layer: String,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<LayersRequest>) -> Result<Envelope<bool>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    if !matches!(body.format.as_deref(), None | Some("yaml")) {
        return Err(ApiError::Generic(format!("unsupported layer format: {}", body.format.unwrap())));
    }

    let mode = match body.action {
        Action::Add => AddMode::Append,
        Action::Combine => AddMode::Combine,
    };
    let label = LayerLabel::new(body.label);

    let current = state.layers.lock().expect("layer stack mutex poisoned").clone();
    let (layers, plan) = warden_plan::add_layer(current, label.clone(), &body.layer, mode)?;

    let new_layer = layers.iter().find(|l| l.label == label).expect("add_layer guarantees the label is present");
    crate::layers_fs::persist_layer(&state.layers_dir, new_layer)?;

    *state.layers.lock().expect("layer stack mutex poisoned") = layers;
    state.overlord.set_plan(Arc::new(plan));

    Ok(Envelope::ok(true))
}

//! Unix-domain HTTP API surface (§4.8, §6, C8): one route per externally
//! visible operation, every one of them translating into either a direct
//! read of a core component or a Change submitted through the overlord.
//! Grounded on `kimberlite-server::http`'s dispatch-table shape, rebuilt
//! on `axum` instead of a hand-rolled router since this daemon serves a
//! Unix socket rather than a bespoke wire protocol over raw `mio`.

pub mod auth;
pub mod envelope;
pub mod error;
pub mod layers_fs;
pub mod metrics;
pub mod rate_limit;
mod routes;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::UdsConnectInfo;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::UnixListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// A caller has this long to finish reading/writing an open request before
/// the connection is dropped (§5 "awaiting an HTTP request on the API" is
/// itself a suspension point the daemon must still be able to cut short on
/// shutdown).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/system-info", get(routes::system_info::get))
        .route("/v1/plan", get(routes::plan::get))
        .route("/v1/layers", post(routes::layers::post))
        .route("/v1/services", get(routes::services::list).post(routes::services::post))
        .route("/v1/services/{name}/log", get(routes::services::log))
        .route("/v1/signals", post(routes::signals::post))
        .route("/v1/checks", get(routes::checks::list).post(routes::checks::post))
        .route("/v1/checks/{name}/log", get(routes::checks::log))
        .route("/v1/health", get(routes::health::get))
        .route("/v1/changes", get(routes::changes::list))
        .route("/v1/changes/{id}", get(routes::changes::get).post(routes::changes::post))
        .route("/v1/notices", get(routes::notices::list).post(routes::notices::post))
        .route("/v1/notices/{id}", get(routes::notices::get))
        .route("/v1/exec", post(routes::exec::post))
        .route("/v1/exec/{id}/stdio", get(routes::exec::stdio))
        .route("/v1/exec/{id}/control", get(routes::exec::control))
        .route("/metrics", get(routes::metrics::get))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API over a Unix socket at `socket_path`, removing any stale
/// socket file left behind by an unclean prior shutdown first (§6
/// "`.pebble.socket`"). Runs until `shutdown` resolves.
pub async fn serve(socket_path: PathBuf, state: Arc<AppState>, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "api listening");

    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<UdsConnectInfo>())
        .with_graceful_shutdown(shutdown)
        .await
}

//! End-to-end coverage for the route table: a real `axum::Router` built
//! from `AppState`, driven in-process via `tower::ServiceExt::oneshot`
//! (no socket involved). Grounded on `kimberlite-cli`'s own integration
//! tests in spirit — exercise the externally visible surface, not the
//! internals — adapted to axum's own idiomatic in-process testing style
//! since this daemon serves HTTP rather than a CLI.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use warden_api::{router, AppState};
use warden_checks::CheckEngine;
use warden_config::IdentityMap;
use warden_overlord::Overlord;
use warden_plan::{combine, Layer};
use warden_reaper::Reaper;
use warden_store::Store;
use warden_supervisor::Supervisor;
use warden_types::LayerLabel;

fn plan_from(yaml: &str) -> Arc<warden_plan::Plan> {
    let layer = Layer::parse(LayerLabel::new("00-base"), 0, yaml).unwrap();
    Arc::new(combine(&[layer]).unwrap())
}

struct Harness {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
    overlord: Arc<Overlord>,
}

fn harness(yaml: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::load(dir.path().join("state.json")).unwrap());
    let reaper = Reaper::install().expect("subreaper install requires no special privilege");
    let supervisor = Arc::new(Supervisor::new(reaper.clone()));
    let checks = Arc::new(CheckEngine::new(reaper.clone(), store.clone()));
    let plan = plan_from(yaml);
    let overlord = Arc::new(Overlord::new(store.clone(), supervisor.clone(), checks.clone(), reaper, plan));
    let state = Arc::new(AppState::new(store, supervisor, checks, overlord.clone(), IdentityMap::new(), dir.path().to_path_buf(), Vec::new()));
    Harness { _dir: dir, state, overlord }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok_when_no_checks_are_registered() {
    let harness = harness("services: {}");
    let response = router(harness.state).oneshot(Request::get("/v1/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn starting_a_service_returns_an_async_change_that_completes() {
    let harness = harness(
        r#"
services:
  one-shot:
    override: replace
    command: ["/bin/true"]
"#,
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(Arc::clone(&harness.overlord).run(shutdown_rx));

    let app = router(harness.state.clone());
    let request = Request::post("/v1/services")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"action":"start","services":["one-shot"]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["type"], "async");
    let change_id = body["change"].as_str().unwrap().to_string();

    let mut done = false;
    for _ in 0..50 {
        let app = router(harness.state.clone());
        let request = Request::get(format!("/v1/changes/{change_id}")).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = body_json(response).await;
        if body["result"]["status"] == "done" {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(done, "change did not complete in time");

    shutdown_tx.send(true).unwrap();
    runner.await.unwrap();
}

#[tokio::test]
async fn an_unknown_service_lookup_returns_not_found() {
    let harness = harness("services: {}");
    let request = Request::get("/v1/services?names=missing").body(Body::empty()).unwrap();
    let response = router(harness.state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["result"]["kind"], "not-found");
}

#[tokio::test]
async fn posting_a_services_action_with_no_names_and_no_autostart_is_rejected() {
    let harness = harness("services: {}");
    let request = Request::post("/v1/services")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"action":"start","services":[]}"#))
        .unwrap();
    let response = router(harness.state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

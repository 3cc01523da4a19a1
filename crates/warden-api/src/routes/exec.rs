//! `POST /v1/exec` (§6): async change id wrapping one `TaskKind::Exec`
//! task, plus the two websocket endpoints a client opens against that
//! task's id to stream its stdio and (best-effort) send it control
//! messages.
//!
//! No example in the retrieved corpus wires up `axum`'s `ws` feature, so
//! these two handlers are built from `axum::extract::ws` directly rather
//! than adapted from a teacher pattern.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_types::{AccessLevel, Status, TaskId};

use crate::auth::{require, CallerAccess};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    command: Vec<String>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default, rename = "working-dir")]
    working_dir: Option<String>,
}

pub async fn post(State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Json(body): Json<ExecRequest>) -> Result<Envelope<()>, ApiError> {
    require(caller, AccessLevel::Admin)?;
    if body.command.is_empty() {
        return Err(ApiError::Generic("exec command must not be empty".to_string()));
    }

    let mut data = warden_store::DataMap::new();
    data.insert("command".to_string(), serde_json::to_value(&body.command).expect("Vec<String> serializes"));
    data.insert("environment".to_string(), serde_json::to_value(&body.environment).expect("BTreeMap<String, String> serializes"));
    if let Some(dir) = body.working_dir {
        data.insert("working_dir".to_string(), serde_json::Value::String(dir));
    }

    let change = state.overlord.enqueue_exec(data)?;
    Ok(Envelope::change(change.id))
}

/// Streams the exec task's log tail, polling the store rather than
/// subscribing to a push channel: the store has no notification hook
/// finer-grained than "a task graph changed" (§4.2), so a short poll loop
/// is the simplest thing that reads true after every `append_task_log`.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn stdio(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(id): Path<TaskId>) -> Result<axum::response::Response, ApiError> {
    require(caller, AccessLevel::Read)?;
    state.store.get_task(id).ok_or_else(|| ApiError::NotFound(id.to_string()))?;
    Ok(ws.on_upgrade(move |socket| stream_stdio(socket, state, id)))
}

async fn stream_stdio(mut socket: WebSocket, state: Arc<AppState>, id: TaskId) {
    let mut sent = 0usize;
    loop {
        let Some(task) = state.store.get_task(id) else { return };
        let lines: Vec<String> = task.logs.iter().skip(sent).cloned().collect();
        sent += lines.len();
        for line in lines {
            if socket.send(Message::Text(line.into())).await.is_err() {
                return;
            }
        }
        if task.status.is_terminal() && sent >= task.logs.len() {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Control messages ask to signal the running exec process. There is no
/// pid tracking at the API layer (the reaper owns that inside
/// `warden-overlord`), so the only control available today is aborting
/// the owning change; anything else gets told so rather than silently
/// doing nothing.
#[derive(Debug, Deserialize)]
struct ControlMessage {
    signal: String,
}

#[derive(Debug, Serialize)]
struct ControlAck {
    ok: bool,
    message: String,
}

pub async fn control(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Extension(caller): Extension<CallerAccess>, Path(id): Path<TaskId>) -> Result<axum::response::Response, ApiError> {
    require(caller, AccessLevel::Admin)?;
    state.store.get_task(id).ok_or_else(|| ApiError::NotFound(id.to_string()))?;
    Ok(ws.on_upgrade(move |socket| handle_control(socket, state, id)))
}

async fn handle_control(mut socket: WebSocket, state: Arc<AppState>, id: TaskId) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let Ok(control) = serde_json::from_str::<ControlMessage>(&text) else { continue };

        let ack = match control.signal.parse::<warden_types::Signal>() {
            Ok(warden_types::Signal::Sigterm | warden_types::Signal::Sigkill) => match abort_owning_change(&state, id) {
                Ok(()) => ControlAck { ok: true, message: "owning change aborted".to_string() },
                Err(err) => ControlAck { ok: false, message: err.to_string() },
            },
            Ok(_) => ControlAck {
                ok: false,
                message: "only SIGTERM/SIGKILL are supported on exec tasks, as an abort of the owning change".to_string(),
            },
            Err(err) => ControlAck { ok: false, message: err.to_string() },
        };

        let reply = serde_json::to_string(&ack).expect("ControlAck serializes");
        if socket.send(Message::Text(reply.into())).await.is_err() {
            return;
        }
        if matches!(state.store.get_task(id), Some(task) if task.status != Status::Do && task.status != Status::Doing) {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }
}

fn abort_owning_change(state: &AppState, task: TaskId) -> Result<(), ApiError> {
    let owner = state
        .store
        .list_changes()
        .into_iter()
        .find(|change| change.tasks.contains(&task))
        .ok_or_else(|| ApiError::NotFound(task.to_string()))?;
    Ok(state.overlord.abort(owner.id)?)
}

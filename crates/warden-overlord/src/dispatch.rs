//! Per-`TaskKind` handlers (§4.6 step 3: "dispatches each to its handler"),
//! plus the mirrored `Hold`→`Undo`→`Undoing` undo pass for cancellation
//! (§4.6). A handler returns `Ok(())` for `Done` or `Err(message)` for
//! `Error`; `RecoverCheck` is the one kind with no handler body here — it
//! stays `Doing` until `warden_checks`'s engine closes it out directly
//! (§4.5), and likewise has no undo body.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use warden_store::{Store, Task};
use warden_types::{CheckName, ServiceName, TaskId, TaskKind};

use crate::Overlord;

impl Overlord {
    pub(crate) async fn dispatch(&self, task: Task) {
        if task.status == warden_types::Status::Hold {
            self.dispatch_undo(task).await;
            return;
        }

        if self.store.set_task_status(task.id, warden_types::Status::Doing).is_err() {
            return;
        }

        if matches!(task.kind, TaskKind::RecoverCheck) {
            return;
        }

        let result = match task.kind {
            TaskKind::StartService => self.handle_start(&task).await,
            TaskKind::StopService => self.handle_stop(&task).await,
            TaskKind::RestartService => self.handle_restart(&task).await,
            TaskKind::RunCheck => self.handle_run_check(&task).await,
            TaskKind::Exec => self.handle_exec(&task).await,
            TaskKind::RecoverCheck => unreachable!("handled above"),
        };

        let status = match &result {
            Ok(()) => warden_types::Status::Done,
            Err(message) => {
                tracing::warn!(task = %task.id, kind = %task.kind, %message, "task handler failed");
                warden_types::Status::Error
            }
        };
        let _ = self.store.set_task_status(task.id, status);
    }

    /// §4.6 cancellation undo pass: a `Hold` task (never dispatched, or
    /// already resolved by `Overlord::abort` killing its in-flight handler
    /// directly) moves through `Undo`/`Undoing` to a terminal status. Every
    /// kind's undo handler must be idempotent; most kinds have nothing to
    /// reverse since `Hold` only ever lands on a task that hadn't started.
    async fn dispatch_undo(&self, task: Task) {
        if self.store.set_task_status(task.id, warden_types::Status::Undo).is_err() {
            return;
        }
        if matches!(task.kind, TaskKind::RecoverCheck) {
            return;
        }
        if self.store.set_task_status(task.id, warden_types::Status::Undoing).is_err() {
            return;
        }

        let result: Result<(), String> = match task.kind {
            TaskKind::Exec | TaskKind::StartService | TaskKind::StopService | TaskKind::RestartService | TaskKind::RunCheck => Ok(()),
            TaskKind::RecoverCheck => unreachable!("handled above"),
        };

        let status = match &result {
            Ok(()) => warden_types::Status::Done,
            Err(message) => {
                tracing::warn!(task = %task.id, kind = %task.kind, %message, "undo handler failed");
                warden_types::Status::Error
            }
        };
        let _ = self.store.set_task_status(task.id, status);
    }

    async fn handle_start(&self, task: &Task) -> Result<(), String> {
        let name = service_name(task)?;
        self.supervisor.start(&name).await.map_err(|err| err.to_string())
    }

    async fn handle_stop(&self, task: &Task) -> Result<(), String> {
        let name = service_name(task)?;
        self.supervisor.stop(&name).await.map_err(|err| err.to_string())
    }

    async fn handle_restart(&self, task: &Task) -> Result<(), String> {
        let name = service_name(task)?;
        self.supervisor.restart(&name).await.map_err(|err| err.to_string())
    }

    async fn handle_run_check(&self, task: &Task) -> Result<(), String> {
        let name = check_name(task)?;
        self.checks.start(&name).await.map_err(|err| err.to_string())
    }

    /// Ad-hoc one-off command execution (§6 `/v1/exec`), spawned and reaped
    /// the same way `warden_checks::probe::run_exec` handles its exec
    /// probes, generalized to an arbitrary caller-supplied command.
    async fn handle_exec(&self, task: &Task) -> Result<(), String> {
        let command = string_array(task, "command")?;
        let [program, args @ ..] = command.as_slice() else {
            return Err("empty command".to_string());
        };
        let environment: BTreeMap<String, String> = task
            .data
            .get("environment")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let working_dir = task.data.get("working_dir").and_then(|v| v.as_str()).map(str::to_string);

        let mut builder = Command::new(program);
        builder.args(args).envs(&environment).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = &working_dir {
            builder.current_dir(dir);
        }

        let mut guard = self.reaper.spawn_guard();
        let mut child = builder.spawn().map_err(|err| err.to_string())?;
        let pid = child.id().ok_or("spawned process has no pid")? as i32;
        let rx = guard.register(pid);
        drop(guard);

        // Tracked so `Overlord::abort` can kill this pid directly if the
        // owning change is aborted while the task is still `Doing` (§4.6).
        self.exec_pids.lock().expect("exec pid registry poisoned").insert(task.id, pid);

        // `/v1/exec/{task-id}/stdio` tails this task's log, so unlike a
        // supervised service's stdio (which goes to its own ring via
        // `warden_supervisor::log`), an exec task's output is appended
        // straight onto the task it belongs to.
        self.spawn_exec_log_readers(task.id, child.stdout.take(), child.stderr.take());
        drop(child); // the reaper owns reaping this pid from here on

        let code = rx.await.map_err(|_| "reaper channel closed before exit".to_string());
        self.exec_pids.lock().expect("exec pid registry poisoned").remove(&task.id);
        let code = code?;
        if code.0 == 0 {
            Ok(())
        } else {
            Err(format!("exited with code {}", code.0))
        }
    }

    /// Spawn the two reader tasks that drain an exec task's stdio into its
    /// task log, the same split-stdout/stderr shape as
    /// `warden_supervisor::log::spawn_readers`, generalized from a
    /// per-service ring to a per-task one so `/v1/exec/{task-id}/stdio` has
    /// something to tail.
    fn spawn_exec_log_readers(&self, task: TaskId, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
        if let Some(stdout) = stdout {
            let store = self.store.clone();
            tokio::spawn(async move { drain_exec_log(store, task, stdout).await });
        }
        if let Some(stderr) = stderr {
            let store = self.store.clone();
            tokio::spawn(async move { drain_exec_log(store, task, stderr).await });
        }
    }
}

async fn drain_exec_log<R: tokio::io::AsyncRead + Unpin>(store: Arc<Store>, task: TaskId, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if store.append_task_log(task, line).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(%task, error = %err, "exec log reader failed");
                return;
            }
        }
    }
}

fn service_name(task: &Task) -> Result<ServiceName, String> {
    task.data
        .get("service")
        .and_then(|v| v.as_str())
        .map(ServiceName::new)
        .ok_or_else(|| "task data is missing \"service\"".to_string())
}

fn check_name(task: &Task) -> Result<CheckName, String> {
    task.data
        .get("check")
        .and_then(|v| v.as_str())
        .map(CheckName::new)
        .ok_or_else(|| "task data is missing \"check\"".to_string())
}

fn string_array(task: &Task, key: &str) -> Result<Vec<String>, String> {
    task.data
        .get(key)
        .and_then(|v| v.as_array())
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| format!("task data is missing \"{key}\""))
}

//! The transactional store (§4.2): a single-writer `Mutex<State>`, with
//! long-running IO (snapshot persistence) kept outside the lock wherever
//! the effect allows it. Handlers that want to mutate the store call one
//! of these methods; the actual mutation happens inside [`commit::apply`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, instrument};
use warden_types::{ChangeId, ChangeKind, NoticeType, Status, TaskId, TaskKind};

use crate::command::{Command, NewTask};
use crate::commit;
use crate::effects::Effect;
use crate::error::{StoreError, StoreResult};
use crate::state::State;
use crate::types::{Change, DataMap, Notice, Scope, Task};

pub struct Store {
    state: Mutex<State>,
    waiters: Mutex<HashMap<ChangeId, Arc<Notify>>>,
    task_notify: Notify,
    snapshot_path: PathBuf,
}

impl Store {
    /// Load the snapshot at `snapshot_path` if it exists, otherwise start
    /// from empty state, then run startup recovery (§4.2 `Doing` → `Do`).
    pub fn load(snapshot_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let snapshot_path = snapshot_path.into();
        debug!(path = %snapshot_path.display(), "loading store snapshot");
        let state = match std::fs::read(&snapshot_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::SnapshotDecode {
                path: snapshot_path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot found, starting fresh");
                State::new()
            }
            Err(source) => {
                return Err(StoreError::SnapshotRead {
                    path: snapshot_path.clone(),
                    source,
                })
            }
        };

        let store = Self {
            state: Mutex::new(state),
            waiters: Mutex::new(HashMap::new()),
            task_notify: Notify::new(),
            snapshot_path,
        };
        store.commit(Command::RecoverIncompleteTasks)?;
        Ok(store)
    }

    fn commit(&self, cmd: Command) -> StoreResult<Vec<Effect>> {
        let now = Utc::now();
        let effects = {
            let mut guard = self.state.lock().expect("store mutex poisoned");
            let state = std::mem::take(&mut *guard);
            let (state, effects) = commit::apply(state, cmd, now);
            *guard = state;
            effects
        };

        for effect in &effects {
            match effect {
                Effect::PersistSnapshot => self.persist_snapshot()?,
                Effect::WakeChange(id) => self.wake(*id),
                Effect::TaskGraphChanged => self.task_notify.notify_waiters(),
            }
        }
        Ok(effects)
    }

    fn wake(&self, id: ChangeId) {
        if let Some(notify) = self.waiters.lock().expect("waiters mutex poisoned").get(&id) {
            notify.notify_waiters();
        }
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, path)
    }

    fn persist_snapshot(&self) -> StoreResult<()> {
        let guard = self.state.lock().expect("store mutex poisoned");
        let bytes = serde_json::to_vec_pretty(&*guard).expect("State serialization is infallible");
        drop(guard);
        Self::write_atomic(&self.snapshot_path, &bytes).map_err(|source| StoreError::SnapshotWrite {
            path: self.snapshot_path.clone(),
            source,
        })
    }

    /// `wait_for` in each `task_specs` entry is a list of indices into this
    /// same `task_specs` (not a `TaskId`): the planner hands back an order
    /// before any task has an id, so callers reference predecessors by
    /// position and the store resolves them atomically on commit.
    #[instrument(skip(self, task_specs))]
    pub fn create_change(
        &self,
        kind: ChangeKind,
        scope: Option<Scope>,
        task_specs: Vec<(TaskKind, Vec<usize>, DataMap)>,
    ) -> StoreResult<Change> {
        let tasks = task_specs
            .into_iter()
            .map(|(kind, wait_for, data)| NewTask { kind, wait_for, data })
            .collect();
        self.commit(Command::CreateChange { kind, scope, tasks })?;
        // The newly created change is always the highest id just assigned.
        let guard = self.state.lock().expect("store mutex poisoned");
        let change = guard
            .changes
            .values()
            .max_by_key(|c| c.id)
            .cloned()
            .expect("CreateChange always inserts exactly one change");
        Ok(change)
    }

    pub fn get_change(&self, id: ChangeId) -> Option<Change> {
        self.state.lock().expect("store mutex poisoned").get_change(id).cloned()
    }

    pub fn list_changes(&self) -> Vec<Change> {
        self.state.lock().expect("store mutex poisoned").changes.values().cloned().collect()
    }

    /// Tasks the overlord's work loop may dispatch right now (§4.6).
    pub fn dispatchable_tasks(&self) -> Vec<Task> {
        self.state.lock().expect("store mutex poisoned").dispatchable_tasks().into_iter().cloned().collect()
    }

    /// Resolves once the task graph may have changed since this call was
    /// made (§5 suspension point "a woken task"). Callers should re-check
    /// [`Store::dispatchable_tasks`] in a loop rather than trust a single
    /// wakeup to mean work is ready, since unrelated commits also wake this.
    pub async fn notified_of_task_graph_change(&self) {
        self.task_notify.notified().await;
    }

    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().expect("store mutex poisoned").get_task(id).cloned()
    }

    pub fn set_task_status(&self, task: TaskId, status: Status) -> StoreResult<()> {
        self.commit(Command::SetTaskStatus { task, status }).map(|_| ())
    }

    pub fn set_task_progress(&self, task: TaskId, done: u64, total: u64) -> StoreResult<()> {
        self.commit(Command::SetTaskProgress { task, done, total }).map(|_| ())
    }

    pub fn append_task_log(&self, task: TaskId, line: impl Into<String>) -> StoreResult<()> {
        self.commit(Command::AppendTaskLog { task, line: line.into() }).map(|_| ())
    }

    pub fn abort_change(&self, change: ChangeId) -> StoreResult<()> {
        self.commit(Command::AbortChange { change }).map(|_| ())
    }

    pub fn raise_notice(&self, kind: NoticeType, key: impl Into<String>, repeat_after: std::time::Duration) -> StoreResult<()> {
        self.commit(Command::RaiseNotice {
            kind,
            key: key.into(),
            repeat_after,
        })
        .map(|_| ())
    }

    pub fn list_notices(&self) -> Vec<Notice> {
        self.state.lock().expect("store mutex poisoned").notices.values().cloned().collect()
    }

    /// Retention sweep (§4.2); callers schedule this periodically.
    pub fn prune(&self, max_age: chrono::Duration) -> StoreResult<()> {
        self.commit(Command::Prune { max_age }).map(|_| ())
    }

    /// Block until `change` reaches a ready state (§4.2, §5 suspension
    /// point "awaiting a change to reach a ready state").
    pub async fn wait_for_change_ready(&self, id: ChangeId) -> Option<Change> {
        loop {
            if let Some(change) = self.get_change(id) {
                if change.ready_time.is_some() {
                    return Some(change);
                }
            } else {
                return None;
            }

            let notify = {
                let mut waiters = self.waiters.lock().expect("waiters mutex poisoned");
                waiters.entry(id).or_insert_with(|| Arc::new(Notify::new())).clone()
            };
            let notified = notify.notified();

            // Re-check after registering interest to close the race between
            // the check above and someone else completing the change.
            if let Some(change) = self.get_change(id) {
                if change.ready_time.is_some() {
                    return Some(change);
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use warden_types::TaskKind;

    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path().join("state.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn change_becomes_done_once_every_task_is_terminal() {
        let (_dir, store) = temp_store();
        let change = store
            .create_change(
                ChangeKind::Start,
                None,
                vec![
                    (TaskKind::StartService, vec![], DataMap::new()),
                    (TaskKind::RunCheck, vec![], DataMap::new()),
                ],
            )
            .unwrap();
        assert_eq!(change.status, Status::Do);
        assert!(change.ready_time.is_none());

        for &task in &change.tasks {
            store.set_task_status(task, Status::Done).unwrap();
        }

        let updated = store.get_change(change.id).unwrap();
        assert_eq!(updated.status, Status::Done);
        assert!(updated.ready_time.is_some());
    }

    #[test]
    fn one_failed_task_marks_the_change_error() {
        let (_dir, store) = temp_store();
        let change = store
            .create_change(
                ChangeKind::Start,
                None,
                vec![
                    (TaskKind::StartService, vec![], DataMap::new()),
                    (TaskKind::RunCheck, vec![], DataMap::new()),
                ],
            )
            .unwrap();

        store.set_task_status(change.tasks[0], Status::Done).unwrap();
        store.set_task_status(change.tasks[1], Status::Error).unwrap();

        let updated = store.get_change(change.id).unwrap();
        assert_eq!(updated.status, Status::Error);
    }

    #[tokio::test]
    async fn waiters_are_woken_once_the_change_is_ready() {
        let (_dir, store) = temp_store();
        let store = std::sync::Arc::new(store);
        let change = store
            .create_change(ChangeKind::Start, None, vec![(TaskKind::StartService, vec![], DataMap::new())])
            .unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move { waiter_store.wait_for_change_ready(change.id).await });

        tokio::task::yield_now().await;
        store.set_task_status(change.tasks[0], Status::Done).unwrap();

        let resolved = waiter.await.unwrap().expect("change exists");
        assert_eq!(resolved.status, Status::Done);
    }

    #[test]
    fn snapshot_survives_reload_and_recovers_doing_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let change_id = {
            let store = Store::load(&path).unwrap();
            let change = store
                .create_change(ChangeKind::Start, None, vec![(TaskKind::StartService, vec![], DataMap::new())])
                .unwrap();
            store.set_task_status(change.tasks[0], Status::Doing).unwrap();
            change.id
        };

        let reloaded = Store::load(&path).unwrap();
        let change = reloaded.get_change(change_id).expect("change persisted");
        let task = reloaded.get_task(change.tasks[0]).expect("task persisted");
        assert_eq!(task.status, Status::Do, "Doing tasks recover to Do on restart");
    }

    #[test]
    fn repeated_notice_within_window_coalesces_instead_of_appending() {
        let (_dir, store) = temp_store();
        store
            .raise_notice(NoticeType::Warning, "log-forwarder-drop", Duration::from_secs(60))
            .unwrap();
        store
            .raise_notice(NoticeType::Warning, "log-forwarder-drop", Duration::from_secs(60))
            .unwrap();

        let notices = store.list_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].occurrences, 2);
    }

    #[test]
    fn prune_drops_old_terminal_changes_but_keeps_fresh_ones() {
        let (_dir, store) = temp_store();
        let old = store
            .create_change(ChangeKind::Start, None, vec![(TaskKind::StartService, vec![], DataMap::new())])
            .unwrap();
        store.set_task_status(old.tasks[0], Status::Done).unwrap();

        let fresh = store
            .create_change(ChangeKind::Stop, None, vec![(TaskKind::StopService, vec![], DataMap::new())])
            .unwrap();

        store.prune(chrono::Duration::seconds(-1)).unwrap();

        assert!(store.get_change(old.id).is_none());
        assert!(store.get_change(fresh.id).is_some());
    }
}

//! The store's in-memory state.
//!
//! State uses a builder pattern - methods take ownership of `self`, mutate,
//! and return `self`, the way `kimberlite-kernel::state::State` does. This
//! keeps the functional core (`command::apply`) free of interior
//! mutability; the `Mutex` lives one layer up, in [`crate::store::Store`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_types::{ChangeId, NoticeId, Status, TaskId};

use crate::types::{Change, Notice, Task};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    pub(crate) changes: BTreeMap<ChangeId, Change>,
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    pub(crate) notices: BTreeMap<NoticeId, Notice>,
    /// `(kind, key)` index for repeat-coalescing (§C).
    pub(crate) notice_index: BTreeMap<(String, String), NoticeId>,
    next_change_id: u64,
    next_task_id: u64,
    next_notice_id: u64,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_change_id(&self) -> ChangeId {
        ChangeId::new(self.next_change_id)
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId::new(self.next_task_id)
    }

    pub fn next_notice_id(&self) -> NoticeId {
        NoticeId::new(self.next_notice_id)
    }

    #[must_use]
    pub fn insert_change(mut self, change: Change) -> Self {
        self.next_change_id = self.next_change_id.max(change.id.get() + 1);
        self.changes.insert(change.id, change);
        self
    }

    #[must_use]
    pub fn insert_task(mut self, task: Task) -> Self {
        self.next_task_id = self.next_task_id.max(task.id.get() + 1);
        self.tasks.insert(task.id, task);
        self
    }

    #[must_use]
    pub fn set_task_status(mut self, id: TaskId, status: Status) -> Self {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.status = status;
        }
        self
    }

    #[must_use]
    pub fn insert_notice(mut self, notice: Notice) -> Self {
        self.next_notice_id = self.next_notice_id.max(notice.id.get() + 1);
        self.notice_index
            .insert((format!("{:?}", notice.kind), notice.key.clone()), notice.id);
        self.notices.insert(notice.id, notice);
        self
    }

    #[must_use]
    pub fn coalesce_notice(mut self, id: NoticeId, now: warden_types::Timestamp) -> Self {
        if let Some(notice) = self.notices.get_mut(&id) {
            notice.coalesce(now);
        }
        self
    }

    pub fn find_coalescible_notice(&self, kind_label: &str, key: &str, now: warden_types::Timestamp) -> Option<NoticeId> {
        let id = *self.notice_index.get(&(kind_label.to_string(), key.to_string()))?;
        let notice = self.notices.get(&id)?;
        notice.within_repeat_window(now).then_some(id)
    }

    pub fn get_change(&self, id: ChangeId) -> Option<&Change> {
        self.changes.get(&id)
    }

    pub fn get_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_statuses(&self, ids: &[TaskId]) -> Vec<Status> {
        ids.iter().filter_map(|id| self.tasks.get(id)).map(|t| t.status).collect()
    }

    /// Tasks the work loop may dispatch right now (§4.6 step 2): status
    /// `Do` whose every `wait-for` task is `Done`, or status `Hold` (§4.6
    /// cancellation) regardless of `wait_for` — an aborted task's undo pass
    /// doesn't need start-order, only the reverse of whatever it already
    /// did or didn't do.
    pub fn dispatchable_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| {
                task.status == Status::Hold
                    || (task.status == Status::Do && task.wait_for.iter().all(|id| self.tasks.get(id).is_some_and(|t| t.status == Status::Done)))
            })
            .collect()
    }

    #[must_use]
    pub fn update_change<F: FnOnce(&mut Change)>(mut self, id: ChangeId, f: F) -> Self {
        if let Some(change) = self.changes.get_mut(&id) {
            f(change);
        }
        self
    }

    /// Startup recovery (§4.2): any task left `Doing` when the daemon died
    /// goes back to `Do` (restartable), unless it's flagged non-idempotent
    /// via `data["non_idempotent"] == true`, in which case it becomes
    /// `Error`. A task left `Undoing` goes back to `Hold` instead — undo
    /// handlers must already be idempotent (§4.6), so retrying the whole
    /// undo pass from scratch is always safe.
    #[must_use]
    pub fn recover_incomplete_tasks(mut self) -> Self {
        for task in self.tasks.values_mut() {
            match task.status {
                Status::Doing => {
                    let non_idempotent = task
                        .data
                        .get("non_idempotent")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false);
                    task.status = if non_idempotent {
                        task.data.insert(
                            "recovery_message".to_string(),
                            serde_json::Value::String("task interrupted by daemon restart; not safely retryable".to_string()),
                        );
                        Status::Error
                    } else {
                        Status::Do
                    };
                }
                Status::Undoing => task.status = Status::Hold,
                _ => {}
            }
        }
        self
    }

    /// Retention sweep (§4.2): drop terminal changes older than `max_age`
    /// and notices past `notice.repeat_after` since `last_occurred` plus
    /// `max_age` grace, relative to `now`.
    #[must_use]
    pub fn prune(mut self, now: warden_types::Timestamp, max_age: chrono::Duration) -> Self {
        let task_ids_to_keep: std::collections::HashSet<TaskId> = self
            .changes
            .values()
            .filter(|c| !Self::is_change_prunable(c, now, max_age))
            .flat_map(|c| c.tasks.iter().copied())
            .collect();

        self.changes
            .retain(|_, c| !Self::is_change_prunable(c, now, max_age));
        self.tasks.retain(|id, _| task_ids_to_keep.contains(id));
        self.notices.retain(|_, n| now - n.last_occurred < max_age);
        let notices = &self.notices;
        self.notice_index.retain(|_, id| notices.contains_key(id));
        self
    }

    fn is_change_prunable(change: &Change, now: warden_types::Timestamp, max_age: chrono::Duration) -> bool {
        change.status.is_terminal() && change.ready_time.is_some_and(|ready| now - ready >= max_age)
    }
}

//! Persisted record shapes (§3): `Change`, `Task`, `Notice`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_types::{
    CheckName, ChangeId, ChangeKind, NoticeId, NoticeType, RingBuffer, ServiceName, Status, TaskId, TaskKind,
    Timestamp,
};

/// What a Change or Task is scoped to, if anything (§3 "optional
/// service/check scope").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Service(ServiceName),
    Check(CheckName),
}

/// Free-form per-Change/Task data (§3 "data map (free-form)").
pub type DataMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

impl Progress {
    pub fn none() -> Self {
        Self { done: 0, total: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: Status,
    pub progress: Progress,
    pub logs: RingBuffer<String>,
    pub wait_for: Vec<TaskId>,
    pub spawn_time: Timestamp,
    pub ready_time: Option<Timestamp>,
    pub data: DataMap,
}

impl Task {
    /// Default per-task log tail (small; the supervisor's per-service ring
    /// in §C "log ring buffer" is a different, much larger buffer).
    pub const DEFAULT_LOG_CAPACITY: usize = 200;

    pub fn new(id: TaskId, kind: TaskKind, spawn_time: Timestamp, wait_for: Vec<TaskId>) -> Self {
        Self {
            id,
            kind,
            status: Status::Do,
            progress: Progress::none(),
            logs: RingBuffer::new(Self::DEFAULT_LOG_CAPACITY),
            wait_for,
            spawn_time,
            ready_time: None,
            data: DataMap::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub kind: ChangeKind,
    pub status: Status,
    pub spawn_time: Timestamp,
    pub ready_time: Option<Timestamp>,
    pub tasks: Vec<TaskId>,
    pub scope: Option<Scope>,
    pub data: DataMap,
}

impl Change {
    pub fn new(id: ChangeId, kind: ChangeKind, spawn_time: Timestamp, tasks: Vec<TaskId>, scope: Option<Scope>) -> Self {
        Self {
            id,
            kind,
            status: Status::Do,
            spawn_time,
            ready_time: None,
            tasks,
            scope,
            data: DataMap::new(),
        }
    }

    /// A Change is ready exactly when every task is in a terminal state
    /// (§3 "Ready ⇔ every task is in a terminal state"). No-op once already
    /// ready; a Change's ready time is set once.
    pub fn recompute_ready(&mut self, task_statuses: &[Status], now: Timestamp) {
        if self.ready_time.is_some() {
            return;
        }
        if !task_statuses.is_empty() && task_statuses.iter().all(|s| s.is_terminal()) {
            self.status = Self::aggregate_status(task_statuses);
            self.ready_time = Some(now);
        }
    }

    /// Aggregate a Change's status from its Tasks' statuses (§4.6): any
    /// `Error` wins, then any `Abort`, else `Done`. `Hold` never appears
    /// here — it isn't terminal, so `recompute_ready` only calls this once
    /// every task has moved past it.
    fn aggregate_status(task_statuses: &[Status]) -> Status {
        if task_statuses.iter().any(|s| *s == Status::Error) {
            Status::Error
        } else if task_statuses.iter().any(|s| *s == Status::Abort) {
            Status::Abort
        } else {
            Status::Done
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: NoticeType,
    pub key: String,
    pub first_occurred: Timestamp,
    pub last_occurred: Timestamp,
    pub repeat_after: std::time::Duration,
    pub occurrences: u64,
}

impl Notice {
    pub fn new(id: NoticeId, kind: NoticeType, key: String, now: Timestamp, repeat_after: std::time::Duration) -> Self {
        Self {
            id,
            kind,
            key,
            first_occurred: now,
            last_occurred: now,
            repeat_after,
            occurrences: 1,
        }
    }

    /// §C "Notice repeat-coalescing": a later occurrence inside the
    /// `repeat-after` window updates in place instead of appending.
    pub fn within_repeat_window(&self, now: Timestamp) -> bool {
        match chrono::Duration::from_std(self.repeat_after) {
            Ok(window) => now - self.last_occurred < window,
            Err(_) => false,
        }
    }

    pub fn coalesce(&mut self, now: Timestamp) {
        self.last_occurred = now;
        self.occurrences += 1;
    }
}

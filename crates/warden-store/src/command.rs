//! Commands the store's functional core accepts. Each call into
//! [`crate::store::Store`] becomes exactly one `Command` applied under the
//! lock, mirroring `kimberlite-kernel::command::Command`.

use warden_types::{ChangeId, ChangeKind, NoticeId, NoticeType, Status, TaskId, TaskKind};

use crate::types::{DataMap, Scope};

#[derive(Debug, Clone)]
pub enum Command {
    /// Create a Change together with its Tasks (§4.8: the API always does
    /// both atomically).
    CreateChange {
        kind: ChangeKind,
        scope: Option<Scope>,
        tasks: Vec<NewTask>,
    },
    SetTaskStatus {
        task: TaskId,
        status: Status,
    },
    SetTaskProgress {
        task: TaskId,
        done: u64,
        total: u64,
    },
    AppendTaskLog {
        task: TaskId,
        line: String,
    },
    AbortChange {
        change: ChangeId,
    },
    RaiseNotice {
        kind: NoticeType,
        key: String,
        repeat_after: std::time::Duration,
    },
    RecoverIncompleteTasks,
    Prune {
        max_age: chrono::Duration,
    },
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    /// Indices into the same `CreateChange`'s task list, resolved to real
    /// `TaskId`s once ids are allocated (§4.7: the planner hands back an
    /// order before any task has an id yet).
    pub wait_for: Vec<usize>,
    pub data: DataMap,
}

//! The store's pure functional core: applying a [`Command`] to a [`State`]
//! produces a new `State` plus the [`Effect`]s the runtime must carry out,
//! mirroring `kimberlite-kernel::kernel::apply_committed`. No IO, no
//! clocks: `now` is threaded in by the caller.

use warden_types::{ChangeId, Status, Timestamp};

use crate::command::Command;
use crate::effects::Effect;
use crate::state::State;
use crate::types::{Change, Task};

pub fn apply(state: State, cmd: Command, now: Timestamp) -> (State, Vec<Effect>) {
    match cmd {
        Command::CreateChange { kind, scope, tasks } => create_change(state, kind, scope, tasks, now),
        Command::SetTaskStatus { task, status } => set_task_status(state, task, status, now),
        Command::SetTaskProgress { task, done, total } => {
            let mut state = state;
            if let Some(t) = state.tasks.get_mut(&task) {
                t.progress.done = done;
                t.progress.total = total;
            }
            (state, vec![Effect::PersistSnapshot])
        }
        Command::AppendTaskLog { task, line } => {
            let mut state = state;
            if let Some(t) = state.tasks.get_mut(&task) {
                t.logs.push(line);
            }
            (state, Vec::new())
        }
        Command::AbortChange { change } => abort_change(state, change, now),
        Command::RaiseNotice { kind, key, repeat_after } => raise_notice(state, kind, key, repeat_after, now),
        Command::RecoverIncompleteTasks => (state.recover_incomplete_tasks(), vec![Effect::PersistSnapshot]),
        Command::Prune { max_age } => (state.prune(now, max_age), vec![Effect::PersistSnapshot]),
    }
}

fn create_change(
    mut state: State,
    kind: warden_types::ChangeKind,
    scope: Option<crate::types::Scope>,
    tasks: Vec<crate::command::NewTask>,
    now: Timestamp,
) -> (State, Vec<Effect>) {
    // Ids are allocated up front, in order, so a task's `wait_for` indices
    // (positions within this same Change) can be resolved to real ids
    // before any task is inserted.
    let mut allocated = state.next_task_id().get();
    let ids: Vec<warden_types::TaskId> = tasks
        .iter()
        .map(|_| {
            let id = warden_types::TaskId::new(allocated);
            allocated += 1;
            id
        })
        .collect();

    let mut task_ids = Vec::with_capacity(tasks.len());
    for (index, new_task) in tasks.into_iter().enumerate() {
        let id = ids[index];
        let wait_for = new_task.wait_for.iter().map(|&i| ids[i]).collect();
        let mut task = Task::new(id, new_task.kind, now, wait_for);
        task.data = new_task.data;
        state = state.insert_task(task);
        task_ids.push(id);
    }

    let change_id = state.next_change_id();
    let change = Change::new(change_id, kind, now, task_ids, scope);
    state = state.insert_change(change);

    (state, vec![Effect::PersistSnapshot, Effect::TaskGraphChanged])
}

fn set_task_status(mut state: State, task: warden_types::TaskId, status: Status, now: Timestamp) -> (State, Vec<Effect>) {
    state = state.set_task_status(task, status);

    let owning_change = state
        .changes
        .values()
        .find(|c| c.tasks.contains(&task))
        .map(|c| c.id);

    let mut effects = vec![Effect::PersistSnapshot, Effect::TaskGraphChanged];
    if let Some(change_id) = owning_change {
        let statuses = state.task_statuses(&state.changes[&change_id].tasks);
        let was_ready = state.changes[&change_id].ready_time.is_some();
        state = state.update_change(change_id, |c| c.recompute_ready(&statuses, now));
        if !was_ready && state.changes[&change_id].ready_time.is_some() {
            effects.push(Effect::WakeChange(change_id));
        }
    }
    (state, effects)
}

/// §4.6 cancellation: the Change's own status flips to `Abort` right away
/// (an immediate acknowledgement of the request), and every task still
/// `Do` — not yet dispatched — moves to `Hold` so the work loop's undo
/// pass picks it up. A task already `Doing` is left alone: its handler is
/// mid-flight and owns recording its own terminal status; cancelling *that*
/// work (e.g. killing an exec'd process) is the overlord's job, since it
/// requires IO this pure core can't do.
fn abort_change(mut state: State, change_id: ChangeId, now: Timestamp) -> (State, Vec<Effect>) {
    let Some(change) = state.changes.get(&change_id).cloned() else {
        return (state, Vec::new());
    };
    if change.status.is_terminal() {
        return (state, Vec::new());
    }

    let mut held_any = false;
    for &task_id in &change.tasks {
        if state.tasks.get(&task_id).is_some_and(|t| t.status == Status::Do) {
            state = state.set_task_status(task_id, Status::Hold);
            held_any = true;
        }
    }

    state = state.update_change(change_id, |c| c.status = Status::Abort);

    let statuses = state.task_statuses(&change.tasks);
    let was_ready = state.changes[&change_id].ready_time.is_some();
    state = state.update_change(change_id, |c| c.recompute_ready(&statuses, now));

    let mut effects = vec![Effect::PersistSnapshot];
    if held_any {
        effects.push(Effect::TaskGraphChanged);
    }
    if !was_ready && state.changes[&change_id].ready_time.is_some() {
        effects.push(Effect::WakeChange(change_id));
    }
    (state, effects)
}

fn raise_notice(
    mut state: State,
    kind: warden_types::NoticeType,
    key: String,
    repeat_after: std::time::Duration,
    now: Timestamp,
) -> (State, Vec<Effect>) {
    let kind_label = format!("{kind:?}");
    if let Some(existing) = state.find_coalescible_notice(&kind_label, &key, now) {
        state = state.coalesce_notice(existing, now);
    } else {
        let id = state.next_notice_id();
        let notice = crate::types::Notice::new(id, kind, key, now, repeat_after);
        state = state.insert_notice(notice);
    }
    (state, vec![Effect::PersistSnapshot])
}

//! Work loop: dequeues ready tasks, dispatches to C4/C5/C7 handlers,
//! advances changes, and drives the graceful-shutdown sequence (§4.6, C6).
//!
//! Grounded on `kimberlite-cluster::ClusterSupervisor::monitor_loop`'s
//! `select!`-driven loop shape, generalized from "poll node health" to
//! "wake on a store commit or a timer, then drain whatever became
//! dispatchable."

mod change;
mod dispatch;
mod error;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument, warn};
use warden_checks::{CheckEngine, OnFailure};
use warden_plan::Plan;
use warden_reaper::Reaper;
use warden_store::Store;
use warden_supervisor::Supervisor;
use warden_types::{CheckName, ChangeKind, ServiceName, StartupMode, TaskKind};

pub use error::{OverlordError, OverlordResult};

/// Default retention sweep period (§4.2 "periodic sweep"); the window
/// itself (what counts as old) is a separate, longer duration passed to
/// `Store::prune`.
const RETENTION_SWEEP_PERIOD: Duration = Duration::from_secs(3600);
const RETENTION_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

pub struct Overlord {
    store: Arc<Store>,
    supervisor: Arc<Supervisor>,
    checks: Arc<CheckEngine>,
    reaper: Reaper,
    plan: Mutex<Arc<Plan>>,
    /// Pid of every `TaskKind::Exec` task currently `Doing`, so
    /// `Overlord::abort` can kill it directly (§4.6 cancellation).
    exec_pids: Mutex<HashMap<warden_types::TaskId, i32>>,
}

impl Overlord {
    /// Builds the overlord and registers every service/check in `plan` with
    /// C4/C5 (there is no "previous plan" to diff against on first load, so
    /// everything is new).
    pub fn new(store: Arc<Store>, supervisor: Arc<Supervisor>, checks: Arc<CheckEngine>, reaper: Reaper, plan: Arc<Plan>) -> Self {
        let overlord = Self {
            store,
            supervisor,
            checks,
            reaper,
            plan: Mutex::new(Arc::new(Plan::default())),
            exec_pids: Mutex::new(HashMap::new()),
        };
        overlord.set_plan(plan);
        overlord
    }

    pub fn current_plan(&self) -> Arc<Plan> {
        self.plan.lock().expect("plan mutex poisoned").clone()
    }

    /// Swap in a freshly combined plan (§4.1 "atomically swapped") and
    /// reconcile C4/C5 against it. A service already registered under the
    /// previous plan is updated in place via `Supervisor::replan` so its
    /// running actor (and live process) survives; a service new to this
    /// plan is registered fresh. `Supervisor::register` would otherwise
    /// silently replace a live actor, orphaning whatever it was
    /// supervising, so it's reserved for names that aren't running yet.
    /// Checks have no in-place update path, so a replanned check's probe
    /// loop simply restarts with the new spec.
    pub fn set_plan(&self, plan: Arc<Plan>) {
        let previous = self.current_plan();

        for (name, spec) in &plan.services {
            match previous.services.get(name) {
                Some(old) if old == spec => {}
                Some(_) => {
                    if let Err(err) = self.supervisor.replan(name, spec.clone()) {
                        warn!(service = %name, %err, "failed to apply replan to a running service");
                    }
                }
                None => self.supervisor.register(name.clone(), spec.clone()),
            }
        }

        for (name, spec) in &plan.checks {
            if previous.checks.get(name) == Some(spec) {
                continue;
            }
            self.checks.register(name.clone(), spec.clone(), on_failure_for(&plan, name));
        }

        *self.plan.lock().expect("plan mutex poisoned") = plan;
    }

    pub fn enqueue_start(&self, names: Vec<ServiceName>) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        change::ordered_change(&self.store, &plan, ChangeKind::Start, TaskKind::StartService, names, warden_planner::plan_start)
    }

    pub fn enqueue_stop(&self, names: Vec<ServiceName>) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        change::ordered_change(&self.store, &plan, ChangeKind::Stop, TaskKind::StopService, names, warden_planner::plan_stop)
    }

    pub fn enqueue_restart(&self, names: Vec<ServiceName>) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        change::ordered_change(&self.store, &plan, ChangeKind::Restart, TaskKind::RestartService, names, warden_planner::plan_start)
    }

    /// §6 `/v1/services` action `replan`: restart the named services under
    /// the currently effective plan, tagged `ChangeKind::Replan` rather than
    /// `Restart` so the change history distinguishes "the plan changed and
    /// this service picked up the new spec" from an operator-requested
    /// restart of an unchanged one.
    pub fn enqueue_replan(&self, names: Vec<ServiceName>) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        change::ordered_change(&self.store, &plan, ChangeKind::Replan, TaskKind::RestartService, names, warden_planner::plan_start)
    }

    /// §4.6/§8 scenario 1 "autostart order": every service whose effective
    /// spec has `startup: enabled`.
    pub fn enqueue_autostart(&self) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        let names = plan
            .services
            .iter()
            .filter(|(_, spec)| spec.startup == StartupMode::Enabled)
            .map(|(name, _)| name.clone())
            .collect();
        change::ordered_change(&self.store, &plan, ChangeKind::Autostart, TaskKind::StartService, names, warden_planner::plan_start)
    }

    pub fn enqueue_check_autostart(&self) -> OverlordResult<warden_store::Change> {
        let plan = self.current_plan();
        let names = plan
            .checks
            .iter()
            .filter(|(_, spec)| spec.startup == StartupMode::Enabled)
            .map(|(name, _)| name.clone())
            .collect();
        change::flat_check_change(&self.store, names)
    }

    /// §4.6 cancellation. `Store::abort_change` moves every not-yet-started
    /// task to `Hold`, but a task already `Doing` is mid-flight inside its
    /// handler and has to be cancelled here instead, since that requires IO
    /// the store's pure core can't do: for a running `TaskKind::Exec` task
    /// this kills the tracked pid, which unblocks `handle_exec`'s own
    /// `rx.await` and lets it record the (killed) exit as usual.
    pub fn abort(&self, change: warden_types::ChangeId) -> OverlordResult<()> {
        if let Some(record) = self.store.get_change(change) {
            for task_id in &record.tasks {
                let Some(task) = self.store.get_task(*task_id) else { continue };
                if task.kind != TaskKind::Exec || task.status != warden_types::Status::Doing {
                    continue;
                }
                let pid = self.exec_pids.lock().expect("exec pid registry poisoned").get(task_id).copied();
                if let Some(pid) = pid {
                    if let Err(err) = warden_reaper::kill(pid, warden_types::Signal::Sigkill.number()) {
                        warn!(task = %task_id, %err, "failed to kill exec task during abort");
                    }
                }
            }
        }
        Ok(self.store.abort_change(change)?)
    }

    /// §6 `POST /v1/exec`: a flat, unordered Change wrapping a single
    /// `TaskKind::Exec` task — there is nothing to sequence since an exec
    /// task isn't a declared service with `before`/`after`/`requires`.
    /// Flagged `non_idempotent` (§4.2) since re-running an arbitrary
    /// caller-supplied command after a crash would do something the caller
    /// never asked for twice; recovery errors it instead of retrying.
    pub fn enqueue_exec(&self, mut data: warden_store::DataMap) -> OverlordResult<warden_store::Change> {
        data.insert("non_idempotent".to_string(), serde_json::Value::Bool(true));
        Ok(self.store.create_change(ChangeKind::Exec, None, vec![(TaskKind::Exec, Vec::new(), data)])?)
    }

    /// The driver loop (§4.6): wakes on a task-graph change, a retention
    /// timer tick, or shutdown, then dispatches everything currently ready.
    /// Handler I/O overlaps (§5): each dispatch is its own task.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut retention_ticker = tokio::time::interval(RETENTION_SWEEP_PERIOD);
        retention_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.dispatch_ready().await;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("overlord work loop stopping");
                        return;
                    }
                }
                _ = retention_ticker.tick() => {
                    if let Err(err) = self.store.prune(chrono::Duration::from_std(RETENTION_MAX_AGE).expect("fixed duration fits")) {
                        warn!(%err, "retention sweep failed");
                    }
                }
                () = self.store.notified_of_task_graph_change() => {}
            }
            self.dispatch_ready().await;
        }
    }

    async fn dispatch_ready(self: &Arc<Self>) {
        for task in self.store.dispatchable_tasks() {
            let overlord = Arc::clone(self);
            tokio::spawn(async move { overlord.dispatch(task).await });
        }
    }

}

/// Resolves the service that owns `check` in its `on_check_failure` map, if
/// any. A check referenced by more than one service is unusual but not
/// forbidden by the data model; the first owner found (by `ServiceName`
/// order) wins.
fn on_failure_for(plan: &Plan, check: &CheckName) -> Option<OnFailure> {
    plan.services.iter().find_map(|(service, spec)| {
        spec.on_check_failure.get(check).map(|action| OnFailure {
            service: service.clone(),
            action: *action,
        })
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use warden_plan::{combine, Layer};
    use warden_types::{LayerLabel, Status};

    use super::*;

    fn plan_from(yaml: &str) -> Arc<Plan> {
        let layer = Layer::parse(LayerLabel::new("00-base"), 0, yaml).unwrap();
        Arc::new(combine(&[layer]).unwrap())
    }

    fn test_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::load(dir.path().join("state.json")).unwrap());
        (dir, store)
    }

    fn test_overlord(plan: Arc<Plan>, store: Arc<Store>) -> Arc<Overlord> {
        let reaper = Reaper::install().expect("subreaper install requires no special privilege");
        let supervisor = Arc::new(Supervisor::new(reaper.clone()));
        let checks = Arc::new(CheckEngine::new(reaper.clone(), store.clone()));
        Arc::new(Overlord::new(store, supervisor, checks, reaper, plan))
    }

    #[tokio::test]
    async fn enqueue_start_builds_a_change_ordered_by_requires() {
        let (_dir, store) = test_store();
        let plan = plan_from(
            r#"
services:
  db:
    override: replace
    command: ["/bin/true"]
  web:
    override: replace
    command: ["/bin/true"]
    requires: ["db"]
"#,
        );
        let overlord = test_overlord(plan, store.clone());

        let change = overlord.enqueue_start(vec![ServiceName::new("web"), ServiceName::new("db")]).unwrap();
        assert_eq!(change.tasks.len(), 2);

        let db_task = store.get_task(change.tasks[0]).unwrap();
        let web_task = store.get_task(change.tasks[1]).unwrap();
        assert_eq!(db_task.data.get("service").and_then(|v| v.as_str()), Some("db"));
        assert_eq!(web_task.data.get("service").and_then(|v| v.as_str()), Some("web"));
        assert_eq!(web_task.wait_for, vec![db_task.id]);
    }

    #[tokio::test]
    async fn the_work_loop_dispatches_a_ready_start_task_to_done() {
        let (_dir, store) = test_store();
        let plan = plan_from(
            r#"
services:
  one-shot:
    override: replace
    command: ["/bin/true"]
"#,
        );
        let overlord = test_overlord(plan, store.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&overlord).run(shutdown_rx));

        let change = overlord.enqueue_start(vec![ServiceName::new("one-shot")]).unwrap();

        let mut status = Status::Do;
        for _ in 0..50 {
            status = store.get_task(change.tasks[0]).unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert_eq!(status, Status::Done);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn set_plan_replans_a_service_that_survives_and_registers_a_new_one() {
        let (_dir, store) = test_store();
        let plan = plan_from(
            r#"
services:
  steady:
    override: replace
    command: ["/bin/sleep", "5"]
"#,
        );
        let overlord = test_overlord(plan, store);
        overlord.supervisor.start(&ServiceName::new("steady")).await.unwrap();

        let next = plan_from(
            r#"
services:
  steady:
    override: replace
    command: ["/bin/sleep", "5"]
    okay_delay: "50ms"
  fresh:
    override: replace
    command: ["/bin/true"]
"#,
        );
        overlord.set_plan(next);

        // `steady` keeps the same actor (replanned, not reregistered): it
        // must still be reachable by name rather than erroring as unknown.
        assert!(overlord.supervisor.state(&ServiceName::new("steady")).is_ok());
        assert!(overlord.supervisor.state(&ServiceName::new("fresh")).is_ok());

        overlord.supervisor.stop(&ServiceName::new("steady")).await.unwrap();
    }

    #[tokio::test]
    async fn aborting_a_change_kills_a_running_exec_task() {
        let (_dir, store) = test_store();
        let overlord = test_overlord(plan_from("services: {}\n"), store.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&overlord).run(shutdown_rx));

        let mut data = warden_store::DataMap::new();
        data.insert("command".to_string(), serde_json::json!(["/bin/sleep", "5"]));
        data.insert("environment".to_string(), serde_json::json!({}));
        let change = overlord.enqueue_exec(data).unwrap();

        // Wait for the handler to actually spawn the process (status
        // `Doing`) before aborting, so `abort` has a tracked pid to kill
        // rather than racing `Store::abort_change`'s own `Hold` path.
        for _ in 0..50 {
            if store.get_task(change.tasks[0]).unwrap().status == Status::Doing {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert_eq!(store.get_task(change.tasks[0]).unwrap().status, Status::Doing);

        overlord.abort(change.id).unwrap();

        let mut status = Status::Doing;
        for _ in 0..100 {
            status = store.get_task(change.tasks[0]).unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert_eq!(status, Status::Error, "killed exec task should surface as a non-zero exit, not silently vanish");

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }
}

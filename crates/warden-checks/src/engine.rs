//! Per-check actor (§4.5): independent periodic probe loop driving the
//! `inactive|up|down` threshold state machine. Grounded on the same
//! `tokio::time::interval` + `select!` shape as
//! `kimberlite-cluster::supervisor::ClusterSupervisor::monitor_loop`,
//! generalized from "poll node health" to three probe kinds.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};
use warden_plan::CheckSpec;
use warden_reaper::Reaper;
use warden_store::{DataMap, Scope, Store};
use warden_types::{CheckName, CheckStatus, ChangeKind, OnCheckFailureAction, ServiceName, TaskKind};

use crate::log::{CheckLog, DEFAULT_LOG_CAPACITY};
use crate::probe;

pub enum EngineCommand {
    Start,
    Stop,
}

pub struct CheckHandle {
    pub commands: mpsc::Sender<EngineCommand>,
    pub status: watch::Receiver<CheckStatus>,
    pub log: Arc<CheckLog>,
}

/// What to do when this check crosses its failure threshold, resolved once
/// at registration time from the owning service's `on_check_failure` map
/// (§3, §4.5).
pub struct OnFailure {
    pub service: ServiceName,
    pub action: OnCheckFailureAction,
}

pub fn spawn_actor(name: CheckName, spec: CheckSpec, reaper: Reaper, store: Arc<Store>, http_client: reqwest::Client, on_failure: Option<OnFailure>) -> CheckHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (status_tx, status_rx) = watch::channel(CheckStatus::Inactive);
    let log = Arc::new(CheckLog::new(DEFAULT_LOG_CAPACITY));

    let actor = Actor {
        name,
        spec,
        reaper,
        store,
        http_client,
        on_failure,
        status_tx,
        commands: cmd_rx,
        log: log.clone(),
    };
    tokio::spawn(actor.run());

    CheckHandle {
        commands: cmd_tx,
        status: status_rx,
        log,
    }
}

struct Actor {
    name: CheckName,
    spec: CheckSpec,
    reaper: Reaper,
    store: Arc<Store>,
    http_client: reqwest::Client,
    on_failure: Option<OnFailure>,
    status_tx: watch::Sender<CheckStatus>,
    commands: mpsc::Receiver<EngineCommand>,
    log: Arc<CheckLog>,
}

impl Actor {
    fn set_status(&self, status: CheckStatus) {
        let _ = self.status_tx.send(status);
    }

    #[instrument(skip(self), fields(check = %self.name))]
    async fn run(mut self) {
        let mut recovery_change = None;

        loop {
            match self.commands.recv().await {
                Some(EngineCommand::Start) => {}
                Some(EngineCommand::Stop) => {
                    self.set_status(CheckStatus::Inactive);
                    continue;
                }
                None => return,
            }

            let mut failures: u32 = 0;
            self.set_status(CheckStatus::Up);
            let mut ticker = tokio::time::interval(self.spec.period);

            'active: loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = probe::run(&self.name, &self.log, &self.spec.probe, self.spec.timeout, &self.reaper, &self.http_client).await;
                        self.handle_probe_result(result, &mut failures, &mut recovery_change).await;
                    }
                    cmd = self.commands.recv() => match cmd {
                        Some(EngineCommand::Stop) => {
                            self.set_status(CheckStatus::Inactive);
                            break 'active;
                        }
                        Some(EngineCommand::Start) => {}
                        None => return,
                    }
                }
            }
        }
    }

    async fn handle_probe_result(&self, result: Result<(), String>, failures: &mut u32, recovery_change: &mut Option<warden_types::ChangeId>) {
        match result {
            Ok(()) => {
                let was_down = *failures >= self.spec.threshold;
                *failures = 0;
                if was_down {
                    self.set_status(CheckStatus::Up);
                    self.on_recovered(recovery_change.take());
                }
            }
            Err(reason) => {
                *failures += 1;
                if *failures == self.spec.threshold {
                    warn!(check = %self.name, reason, "check reached failure threshold");
                    self.set_status(CheckStatus::Down);
                    *recovery_change = Some(self.on_failure_threshold_reached());
                }
            }
        }
    }

    fn on_failure_threshold_reached(&self) -> warden_types::ChangeId {
        let recover = self
            .store
            .create_change(
                ChangeKind::RecoverCheck,
                Some(Scope::Check(self.name.clone())),
                vec![(TaskKind::RecoverCheck, vec![], DataMap::new())],
            )
            .expect("store commit is infallible for well-formed changes");

        if let Some(on_failure) = &self.on_failure {
            match on_failure.action {
                OnCheckFailureAction::Restart => {
                    let _ = self.store.create_change(
                        ChangeKind::Restart,
                        Some(Scope::Service(on_failure.service.clone())),
                        vec![(TaskKind::RestartService, vec![], DataMap::new())],
                    );
                }
                OnCheckFailureAction::Shutdown => {
                    let _ = self.store.create_change(
                        ChangeKind::Stop,
                        Some(Scope::Service(on_failure.service.clone())),
                        vec![(TaskKind::StopService, vec![], DataMap::new())],
                    );
                }
                OnCheckFailureAction::Ignore => {}
            }
        }

        recover.id
    }

    fn on_recovered(&self, recovery_change: Option<warden_types::ChangeId>) {
        info!(check = %self.name, "check recovered");
        let Some(change_id) = recovery_change else { return };
        let Some(change) = self.store.get_change(change_id) else { return };
        for task in change.tasks {
            let _ = self.store.set_task_status(task, warden_types::Status::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use warden_plan::ProbeSpec;
    use warden_types::{ChangeKind, StartupMode};

    use super::*;

    fn test_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::load(dir.path().join("state.json")).unwrap());
        (dir, store)
    }

    fn exec_check(command: &[&str], threshold: u32) -> CheckSpec {
        CheckSpec {
            level: None,
            period: Duration::from_millis(20),
            timeout: Duration::from_millis(200),
            threshold,
            startup: StartupMode::Enabled,
            probe: ProbeSpec::Exec {
                command: command.iter().map(|s| s.to_string()).collect(),
                environment: BTreeMap::new(),
                working_dir: None,
                user: None,
                group: None,
            },
        }
    }

    #[tokio::test]
    async fn a_healthy_check_starts_up() {
        let (_dir, store) = test_store();
        let name = CheckName::new("c1");
        let handle = spawn_actor(name, exec_check(&["/bin/true"], 3), Reaper::install().unwrap(), store, reqwest::Client::new(), None);

        handle.commands.send(EngineCommand::Start).await.unwrap();
        let mut status = handle.status.clone();
        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), CheckStatus::Up);
    }

    #[tokio::test]
    async fn failure_threshold_creates_a_recover_change_and_dispatches_on_failure_action() {
        let (_dir, store) = test_store();
        let name = CheckName::new("c1");
        let service = ServiceName::new("s1");
        let on_failure = Some(OnFailure { service: service.clone(), action: OnCheckFailureAction::Restart });
        let handle = spawn_actor(name.clone(), exec_check(&["/bin/false"], 3), Reaper::install().unwrap(), store.clone(), reqwest::Client::new(), on_failure);

        handle.commands.send(EngineCommand::Start).await.unwrap();
        let mut status = handle.status.clone();
        loop {
            status.changed().await.unwrap();
            if *status.borrow() == CheckStatus::Down {
                break;
            }
        }

        let changes = store.list_changes();
        assert!(changes.iter().any(|c| c.kind == ChangeKind::RecoverCheck && c.scope == Some(Scope::Check(name.clone()))));
        assert!(changes.iter().any(|c| c.kind == ChangeKind::Restart && c.scope == Some(Scope::Service(service.clone()))));
    }

    #[tokio::test]
    async fn stop_sets_status_inactive() {
        let (_dir, store) = test_store();
        let name = CheckName::new("c1");
        let handle = spawn_actor(name, exec_check(&["/bin/true"], 3), Reaper::install().unwrap(), store, reqwest::Client::new(), None);

        handle.commands.send(EngineCommand::Start).await.unwrap();
        handle.commands.send(EngineCommand::Stop).await.unwrap();

        let mut status = handle.status.clone();
        loop {
            status.changed().await.unwrap();
            if *status.borrow() == CheckStatus::Inactive {
                break;
            }
        }
    }
}

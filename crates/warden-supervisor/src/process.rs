//! The per-service actor (§4.4): one task per service driving the state
//! machine
//!
//! ```text
//! initial ──start──▶ starting ──ok-window-elapsed──▶ running
//! starting ──early-exit──▶ backoff | exited
//! running  ──stop signal──▶ stopping ──reaped──▶ stopped
//! running  ──process exit──▶ backoff | exited
//! backoff  ──delay-elapsed──▶ starting
//! stopping ──kill-timeout──▶ send SIGKILL──▶ stopped
//! ```
//!
//! Grounded on `kimberlite-cluster::node::NodeProcess` (start/stop/restart,
//! exponential backoff) and `supervisor::ClusterSupervisor::monitor_loop`'s
//! `select!`-driven shape, generalized to the plan's configurable backoff
//! and to the reaper-mediated stop protocol (`tokio::process::Child::kill`
//! always sends `SIGKILL`, which §4.4's stop protocol forbids for the
//! first step).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command as TokioCommand;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, instrument, warn};
use warden_plan::ServiceSpec;
use warden_reaper::{ExitCode, Reaper};
use warden_types::{RestartPolicy, ServiceName, ServiceState};

use crate::error::{SupervisorError, SupervisorResult};
use crate::log::{self, NoticeRaiser, ServiceLog, DEFAULT_LOG_CAPACITY};

pub enum ActorCommand {
    Start,
    Stop,
    Signal(i32, oneshot::Sender<SupervisorResult<()>>),
    Replan(ServiceSpec),
}

/// A handle the supervisor keeps per service; the actor itself runs on a
/// spawned task and is only reachable through this.
pub struct ServiceHandle {
    pub commands: mpsc::Sender<ActorCommand>,
    pub state: watch::Receiver<ServiceState>,
    pub log: Arc<ServiceLog>,
}

pub fn spawn_actor(
    name: ServiceName,
    spec: ServiceSpec,
    reaper: Reaper,
    forward: Option<Arc<crate::bounded_queue::BoundedQueue<log::LogLine>>>,
    notice_raiser: Option<NoticeRaiser>,
) -> ServiceHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(ServiceState::Initial);
    let log = Arc::new(ServiceLog::new(DEFAULT_LOG_CAPACITY, forward, notice_raiser));

    let actor = Actor {
        name,
        spec,
        reaper,
        log: log.clone(),
        state_tx,
        commands: cmd_rx,
    };
    tokio::spawn(actor.run());

    ServiceHandle {
        commands: cmd_tx,
        state: state_rx,
        log,
    }
}

struct Actor {
    name: ServiceName,
    spec: ServiceSpec,
    reaper: Reaper,
    log: Arc<ServiceLog>,
    state_tx: watch::Sender<ServiceState>,
    commands: mpsc::Receiver<ActorCommand>,
}

/// What to do once the service leaves `starting`/`running` unexpectedly.
enum ExitOutcome {
    Restart,
    Terminal,
}

impl Actor {
    fn set_state(&self, state: ServiceState) {
        let _ = self.state_tx.send(state);
    }

    fn state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    #[instrument(skip(self), fields(service = %self.name))]
    async fn run(mut self) {
        let mut pid: Option<i32> = None;
        let mut exit_rx: Option<oneshot::Receiver<ExitCode>> = None;
        let mut attempts: u32 = 0;
        let mut stop_requested = false;

        loop {
            match self.state() {
                ServiceState::Initial | ServiceState::Stopped | ServiceState::Terminated | ServiceState::Exited => {
                    match self.commands.recv().await {
                        Some(ActorCommand::Start) => {
                            attempts = 0;
                            stop_requested = false;
                            self.set_state(ServiceState::Starting);
                        }
                        Some(ActorCommand::Stop) => self.set_state(ServiceState::Stopped),
                        Some(ActorCommand::Signal(_, reply)) => {
                            let _ = reply.send(Err(SupervisorError::NotRunning { service: self.name.clone() }));
                        }
                        Some(ActorCommand::Replan(spec)) => self.spec = spec,
                        None => return,
                    }
                }

                ServiceState::Starting => {
                    if pid.is_none() {
                        match self.spawn_child().await {
                            Ok((new_pid, rx)) => {
                                pid = Some(new_pid);
                                exit_rx = Some(rx);
                            }
                            Err(err) => {
                                warn!(service = %self.name, error = %err, "spawn failed");
                                self.set_state(ServiceState::Backoff);
                                continue;
                            }
                        }
                    }

                    let okay_delay = tokio::time::sleep(self.spec.okay_delay);
                    tokio::select! {
                        () = okay_delay => {
                            attempts = 0;
                            self.set_state(ServiceState::Running);
                        }
                        code = recv_exit(&mut exit_rx) => {
                            pid = None;
                            self.on_exit(code, &mut attempts, stop_requested);
                        }
                        cmd = self.commands.recv() => {
                            if !self.handle_admin_command(cmd, &mut pid, &mut stop_requested).await {
                                return;
                            }
                        }
                    }
                }

                ServiceState::Running => {
                    tokio::select! {
                        code = recv_exit(&mut exit_rx) => {
                            pid = None;
                            self.on_exit(code, &mut attempts, stop_requested);
                        }
                        cmd = self.commands.recv() => {
                            if !self.handle_admin_command(cmd, &mut pid, &mut stop_requested).await {
                                return;
                            }
                        }
                    }
                }

                ServiceState::Backoff => {
                    let delay = backoff_delay(&self.spec, attempts);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => self.set_state(ServiceState::Starting),
                        cmd = self.commands.recv() => {
                            if !self.handle_admin_command(cmd, &mut pid, &mut stop_requested).await {
                                return;
                            }
                        }
                    }
                }

                ServiceState::Stopping => {
                    let Some(active_pid) = pid else {
                        self.set_state(ServiceState::Stopped);
                        continue;
                    };
                    tokio::select! {
                        code = recv_exit(&mut exit_rx) => {
                            let _ = code;
                            pid = None;
                            self.set_state(ServiceState::Stopped);
                        }
                        () = tokio::time::sleep(self.spec.kill_delay) => {
                            warn!(service = %self.name, pid = active_pid, "kill-delay elapsed, sending SIGKILL");
                            let _ = warden_reaper::kill(active_pid, warden_types::Signal::Sigkill.number());
                            let code = recv_exit(&mut exit_rx).await;
                            let _ = code;
                            pid = None;
                            self.set_state(ServiceState::Stopped);
                        }
                    }
                }
            }
        }
    }

    /// Handle a command common to every "busy" state (starting/running/
    /// backoff). Returns `false` when the actor should shut down (channel
    /// closed, i.e. the supervisor dropped the handle).
    async fn handle_admin_command(&mut self, cmd: Option<ActorCommand>, pid: &mut Option<i32>, stop_requested: &mut bool) -> bool {
        match cmd {
            Some(ActorCommand::Start) => {}
            Some(ActorCommand::Stop) => {
                if let Some(active_pid) = *pid {
                    *stop_requested = true;
                    if warden_reaper::kill(active_pid, self.signal_number()).is_err() {
                        // Process is already gone; the reaper will still
                        // deliver its exit code shortly.
                    }
                    self.set_state(ServiceState::Stopping);
                } else {
                    self.set_state(ServiceState::Stopped);
                }
            }
            Some(ActorCommand::Signal(signal, reply)) => {
                let result = match *pid {
                    Some(active_pid) => warden_reaper::kill(active_pid, signal).map_err(|source| SupervisorError::Signal {
                        service: self.name.clone(),
                        source,
                    }),
                    None => Err(SupervisorError::NotRunning { service: self.name.clone() }),
                };
                let _ = reply.send(result);
            }
            Some(ActorCommand::Replan(spec)) => self.spec = spec,
            None => return false,
        }
        true
    }

    fn signal_number(&self) -> i32 {
        warden_types::Signal::Sigterm.number()
    }

    fn on_exit(&self, code: ExitCode, attempts: &mut u32, stop_requested: bool) {
        info!(service = %self.name, exit_code = code.0, "service exited");
        if stop_requested {
            self.set_state(ServiceState::Stopped);
            return;
        }
        match outcome_for(self.spec.restart, code) {
            ExitOutcome::Restart => {
                *attempts += 1;
                self.set_state(ServiceState::Backoff);
            }
            ExitOutcome::Terminal => self.set_state(ServiceState::Exited),
        }
    }

    async fn spawn_child(&self) -> SupervisorResult<(i32, oneshot::Receiver<ExitCode>)> {
        let [program, args @ ..] = self.spec.command.as_slice() else {
            return Err(SupervisorError::Spawn {
                service: self.name.clone(),
                source: std::io::Error::other("empty command"),
            });
        };

        let mut command = TokioCommand::new(program);
        command
            .args(args)
            .envs(&self.spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }

        let mut guard = self.reaper.spawn_guard();
        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            service: self.name.clone(),
            source,
        })?;
        let pid = child.id().expect("freshly spawned child has a pid") as i32;
        let rx = guard.register(pid);
        drop(guard);

        log::spawn_readers(self.name.clone(), self.log.clone(), child.stdout.take(), child.stderr.take());
        // Don't wait on `child`: the reaper already owns this pid via
        // waitpid(2). Dropping the handle here does not kill or reap it.
        drop(child);

        Ok((pid, rx))
    }
}

fn outcome_for(policy: RestartPolicy, code: ExitCode) -> ExitOutcome {
    let success = code.0 == 0;
    let should_restart = match policy {
        RestartPolicy::Never => false,
        RestartPolicy::OnSuccess => success,
        RestartPolicy::OnFailure => !success,
    };
    if should_restart {
        ExitOutcome::Restart
    } else {
        ExitOutcome::Terminal
    }
}

/// `delay = min(max, initial * factor^attempts)` (§4.4).
fn backoff_delay(spec: &ServiceSpec, attempts: u32) -> Duration {
    let scaled = spec.backoff.initial_delay.mul_f64(spec.backoff.factor.powi(attempts as i32));
    scaled.min(spec.backoff.max)
}

async fn recv_exit(slot: &mut Option<oneshot::Receiver<ExitCode>>) -> ExitCode {
    match slot {
        Some(rx) => {
            let result = rx.await.unwrap_or(ExitCode(-1));
            *slot = None;
            result
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use warden_plan::BackoffSpec;
    use warden_types::StartupMode;

    use super::*;

    fn sample_spec() -> ServiceSpec {
        ServiceSpec {
            command: vec!["/bin/true".to_string()],
            environment: Default::default(),
            working_dir: None,
            user: None,
            group: None,
            startup: StartupMode::Disabled,
            restart: RestartPolicy::OnFailure,
            backoff: BackoffSpec {
                initial_delay: Duration::from_millis(500),
                factor: 2.0,
                max: Duration::from_secs(30),
            },
            requires: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            kill_delay: Duration::from_secs(5),
            okay_delay: Duration::from_secs(1),
            on_check_failure: Default::default(),
            log_targets: Vec::new(),
            on_start: None,
            on_stop: None,
        }
    }

    #[test]
    fn backoff_delay_is_capped_at_max() {
        let spec = sample_spec();
        let at_cap = backoff_delay(&spec, 10);
        assert_eq!(at_cap, spec.backoff.max);
    }

    #[test]
    fn backoff_delay_grows_by_factor() {
        let spec = sample_spec();
        let first = backoff_delay(&spec, 0);
        let second = backoff_delay(&spec, 1);
        assert_eq!(first, spec.backoff.initial_delay);
        assert_eq!(second, spec.backoff.initial_delay.mul_f64(spec.backoff.factor));
    }

    #[test]
    fn never_restart_is_always_terminal() {
        assert!(matches!(outcome_for(RestartPolicy::Never, ExitCode(0)), ExitOutcome::Terminal));
        assert!(matches!(outcome_for(RestartPolicy::Never, ExitCode(1)), ExitOutcome::Terminal));
    }

    #[test]
    fn on_failure_restarts_only_on_nonzero_exit() {
        assert!(matches!(outcome_for(RestartPolicy::OnFailure, ExitCode(0)), ExitOutcome::Terminal));
        assert!(matches!(outcome_for(RestartPolicy::OnFailure, ExitCode(1)), ExitOutcome::Restart));
    }
}

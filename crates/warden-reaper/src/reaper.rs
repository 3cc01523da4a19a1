//! Child-process reaping (§4.3): the daemon sets itself as Linux
//! child-subreaper so that orphaned grandchildren re-parent to it instead of
//! PID 1, then drains exited children off a single `SIGCHLD` stream.
//!
//! `tokio::process::Child` is deliberately not used for exit-status
//! delivery: the teacher's own `NodeProcess::stop` notes that `Child::kill`
//! always sends `SIGKILL` on Unix, which is wrong for a graceful stop
//! protocol, and tokio's own child reaping would race our manual
//! `waitpid(2)` loop over the same pids. Callers spawn with
//! `std::process::Command`/`tokio::process::Command` themselves, hand the
//! resulting pid to [`Reaper::register`], and wait on the returned receiver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

use crate::error::{ReaperError, ReaperResult};

/// A child's exit status, collapsed to a single process-manager-style code
/// (§4.3: "signal-terminated ⇒ 128 + signal").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    fn from_waitpid_status(status: i32) -> Self {
        if libc::WIFEXITED(status) {
            Self(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            Self(128 + libc::WTERMSIG(status))
        } else {
            Self(-1)
        }
    }
}

/// Send a raw POSIX signal to `pid`, matching §4.4's "Signalling" and stop
/// protocol. The only `kill(2)` call site in the workspace; everything else
/// sends signals through here instead of reaching for `libc` directly.
pub fn kill(pid: i32, signal: i32) -> std::io::Result<()> {
    // SAFETY: `kill` takes two plain integers and has no memory-safety
    // preconditions beyond the pid being a valid `pid_t`.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

type Registry = Mutex<HashMap<i32, oneshot::Sender<ExitCode>>>;

/// Holds the registry lock across a spawn, so a child that exits before its
/// pid is registered cannot be reaped (and its exit code lost) until
/// registration completes. See module docs and [`Reaper::spawn_guard`].
pub struct SpawnGuard<'a> {
    registry: MutexGuard<'a, HashMap<i32, oneshot::Sender<ExitCode>>>,
}

impl SpawnGuard<'_> {
    /// Register `pid`, returning the receiver its exit code will arrive on.
    pub fn register(&mut self, pid: i32) -> oneshot::Receiver<ExitCode> {
        let (tx, rx) = oneshot::channel();
        self.registry.insert(pid, tx);
        rx
    }
}

/// Owns the pid -> exit-code registry and the background SIGCHLD drain
/// loop. One instance per daemon process.
#[derive(Clone)]
pub struct Reaper {
    registry: Arc<Registry>,
}

impl Reaper {
    /// Sets `PR_SET_CHILD_SUBREAPER` and spawns the background drain task.
    pub fn install() -> ReaperResult<Self> {
        // SAFETY: `prctl` with `PR_SET_CHILD_SUBREAPER` takes no pointer
        // arguments and is documented to always succeed for this option on
        // Linux; we still check its return for portability.
        let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
        if rc != 0 {
            return Err(ReaperError::SubreaperUnavailable(std::io::Error::last_os_error()));
        }

        let mut sigchld = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::child())
            .map_err(ReaperError::SignalUnavailable)?;

        let registry: Arc<Registry> = Arc::new(Mutex::new(HashMap::new()));
        let task_registry = registry.clone();
        tokio::spawn(async move {
            loop {
                if sigchld.recv().await.is_none() {
                    warn!("SIGCHLD stream closed, reaper drain loop exiting");
                    return;
                }
                Self::drain(&task_registry);
            }
        });

        debug!("installed as child-subreaper");
        Ok(Self { registry })
    }

    /// Take the registry lock for the duration of a spawn + register, so
    /// the drain loop cannot reap the child before its slot exists.
    pub fn spawn_guard(&self) -> SpawnGuard<'_> {
        SpawnGuard {
            registry: self.registry.lock().expect("reaper registry poisoned"),
        }
    }

    /// Register a pid that was spawned without going through
    /// [`spawn_guard`] (e.g. in tests). Prefer `spawn_guard` for real spawns
    /// to avoid the registration race described in the module docs.
    pub fn register(&self, pid: i32) -> oneshot::Receiver<ExitCode> {
        self.spawn_guard().register(pid)
    }

    pub fn unregister(&self, pid: i32) {
        self.registry.lock().expect("reaper registry poisoned").remove(&pid);
    }

    #[instrument(skip(registry))]
    fn drain(registry: &Registry) {
        let mut guard = registry.lock().expect("reaper registry poisoned");
        loop {
            let mut status: i32 = 0;
            // SAFETY: `status` is a valid `&mut i32`; `waitpid` writes at
            // most one `i32` through it and we only read it after the call
            // reports that write happened (pid > 0).
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let exit_code = ExitCode::from_waitpid_status(status);
            match guard.remove(&pid) {
                Some(tx) => {
                    trace!(pid, code = exit_code.0, "delivering exit code");
                    let _ = tx.send(exit_code);
                }
                None => trace!(pid, code = exit_code.0, "reaped unregistered pid"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_decodes_normal_exit() {
        // WIFEXITED/WEXITSTATUS encode a normal exit(n) as (n << 8).
        let status = 7 << 8;
        assert_eq!(ExitCode::from_waitpid_status(status), ExitCode(7));
    }

    #[test]
    fn exit_status_decodes_signal_termination_as_128_plus_signal() {
        // WIFSIGNALED/WTERMSIG encode termination by signal `s` as just `s`
        // in the low byte (no WIFEXITED bit set).
        let status = libc::SIGKILL;
        assert_eq!(ExitCode::from_waitpid_status(status), ExitCode(128 + libc::SIGKILL));
    }

    #[tokio::test]
    async fn reaped_child_delivers_its_exit_code_to_the_registered_waiter() {
        let reaper = Reaper::install().expect("subreaper install requires no special privilege");

        let mut child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("exit 3")
            .spawn()
            .expect("/bin/sh is available in the test environment");
        let pid = child.id().expect("freshly spawned child has a pid") as i32;

        let mut guard = reaper.spawn_guard();
        let rx = guard.register(pid);
        drop(guard);

        let code = rx.await.expect("reaper delivers an exit code");
        assert_eq!(code, ExitCode(3));

        // tokio's own handle must not be waited on: the reaper already
        // consumed this pid's status via waitpid(2).
        let _ = child.try_wait();
    }

    #[tokio::test]
    async fn unregistered_children_are_silently_reaped() {
        let reaper = Reaper::install().expect("subreaper install requires no special privilege");
        let mut child = tokio::process::Command::new("/bin/true")
            .spawn()
            .expect("/bin/true is available in the test environment");
        let pid = child.id().unwrap() as i32;

        // Give the child a moment to exit, then let the SIGCHLD handler
        // drain it without ever registering a waiter.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        reaper.unregister(pid);
        let _ = child.try_wait();
    }
}

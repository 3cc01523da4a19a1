//! Health check engine: http/tcp/exec probes, failure-threshold state
//! machine, on-check-failure dispatch (§4.5, C5).

mod engine;
mod error;
mod log;
mod probe;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use engine::{EngineCommand, OnFailure};
pub use error::{CheckError, CheckResult};
pub use log::CheckLog;
use warden_plan::CheckSpec;
use warden_reaper::Reaper;
use warden_store::Store;
use warden_types::{CheckLevel, CheckName, CheckStatus};

struct Entry {
    level: Option<CheckLevel>,
    handle: engine::CheckHandle,
}

/// Owns one actor per registered check. Grounded on `ClusterSupervisor`'s
/// role as the registry that owns per-node handles, generalized to checks.
pub struct CheckEngine {
    reaper: Reaper,
    store: Arc<Store>,
    http_client: reqwest::Client,
    checks: Mutex<HashMap<CheckName, Entry>>,
}

impl CheckEngine {
    pub fn new(reaper: Reaper, store: Arc<Store>) -> Self {
        Self {
            reaper,
            store,
            http_client: reqwest::Client::new(),
            checks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: CheckName, spec: CheckSpec, on_failure: Option<OnFailure>) {
        let level = spec.level;
        let handle = engine::spawn_actor(name.clone(), spec, self.reaper.clone(), self.store.clone(), self.http_client.clone(), on_failure);
        self.checks.lock().expect("check registry poisoned").insert(name, Entry { level, handle });
    }

    pub async fn start(&self, name: &CheckName) -> CheckResult<()> {
        self.send(name, EngineCommand::Start).await
    }

    pub async fn stop(&self, name: &CheckName) -> CheckResult<()> {
        self.send(name, EngineCommand::Stop).await
    }

    async fn send(&self, name: &CheckName, cmd: EngineCommand) -> CheckResult<()> {
        let sender = self
            .checks
            .lock()
            .expect("check registry poisoned")
            .get(name)
            .map(|e| e.handle.commands.clone())
            .ok_or_else(|| CheckError::UnknownCheck(name.clone()))?;
        sender.send(cmd).await.map_err(|_| CheckError::UnknownCheck(name.clone()))
    }

    pub fn status(&self, name: &CheckName) -> CheckResult<CheckStatus> {
        self.checks
            .lock()
            .expect("check registry poisoned")
            .get(name)
            .map(|e| *e.handle.status.borrow())
            .ok_or_else(|| CheckError::UnknownCheck(name.clone()))
    }

    /// `healthy` iff no check at `level` is currently `down` (§4.5
    /// "Aggregate health").
    pub fn healthy(&self, level: CheckLevel) -> bool {
        self.checks
            .lock()
            .expect("check registry poisoned")
            .values()
            .filter(|entry| entry.level == Some(level))
            .all(|entry| *entry.handle.status.borrow() != CheckStatus::Down)
    }

    /// Every registered check name, for listing endpoints with no `names`
    /// filter (§6 `GET /v1/checks`).
    pub fn names(&self) -> Vec<CheckName> {
        self.checks.lock().expect("check registry poisoned").keys().cloned().collect()
    }

    pub fn level(&self, name: &CheckName) -> CheckResult<Option<CheckLevel>> {
        self.checks
            .lock()
            .expect("check registry poisoned")
            .get(name)
            .map(|e| e.level)
            .ok_or_else(|| CheckError::UnknownCheck(name.clone()))
    }

    /// Tail of an exec probe's captured stdout/stderr (§4.5); http/tcp
    /// probes never populate this, so the tail is simply empty for them.
    pub fn log_tail(&self, name: &CheckName) -> CheckResult<Vec<String>> {
        self.checks
            .lock()
            .expect("check registry poisoned")
            .get(name)
            .map(|e| e.handle.log.tail())
            .ok_or_else(|| CheckError::UnknownCheck(name.clone()))
    }
}

//! Polls for the two fatal conditions that should take the whole daemon
//! down rather than just the one service or check involved (§6 exit codes
//! 10/11): a service that has permanently exited, or a check whose
//! `on-check-failure: shutdown` threshold fired. Neither `warden-supervisor`
//! nor `warden-checks` has a path back to the process-level shutdown
//! decision, so this polls their public status accessors instead of being
//! called back — grounded on `kimberlite-cluster::ClusterSupervisor::monitor_loop`'s
//! own tick-driven health poll, generalized from "is the node alive" to
//! "has anything crossed its terminal failure condition."

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::warn;
use warden_checks::CheckEngine;
use warden_overlord::Overlord;
use warden_supervisor::Supervisor;
use warden_types::{CheckStatus, OnCheckFailureAction, ServiceState};

use crate::exit_code::{ShutdownRequest, ShutdownReason};

const POLL_PERIOD: Duration = Duration::from_secs(1);

pub async fn run(overlord: Arc<Overlord>, supervisor: Arc<Supervisor>, checks: Arc<CheckEngine>, request: ShutdownRequest) {
    let mut tick = interval(POLL_PERIOD);
    loop {
        tick.tick().await;

        for name in supervisor.names() {
            if supervisor.state(&name).ok() == Some(ServiceState::Exited) {
                warn!(service = %name, "service exited permanently, shutting the daemon down");
                request.request(ShutdownReason::ServiceFailure);
                return;
            }
        }

        let plan = overlord.current_plan();
        let shutdown_checks: BTreeSet<_> = plan
            .services
            .values()
            .flat_map(|spec| spec.on_check_failure.iter())
            .filter(|(_, action)| **action == OnCheckFailureAction::Shutdown)
            .map(|(check, _)| check.clone())
            .collect();

        for name in shutdown_checks {
            if checks.status(&name).ok() == Some(CheckStatus::Down) {
                warn!(check = %name, "check failed with on-check-failure: shutdown, shutting the daemon down");
                request.request(ShutdownReason::CheckFailure);
                return;
            }
        }
    }
}

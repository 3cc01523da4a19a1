//! SIGINT/SIGTERM funnel (§5 "Cancellation"): the first signal asks for a
//! graceful stop; a second forces immediate termination. Grounded on
//! `kimberlite-cluster::ClusterSupervisor::monitor_loop`'s single
//! `tokio::select!` over a ticker and `signal::ctrl_c()`, generalized to
//! both Unix termination signals and to the daemon's two-signal contract.

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::exit_code::{ShutdownRequest, ShutdownReason};

pub fn install(request: ShutdownRequest) {
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler installs");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler installs");

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("received shutdown signal, stopping gracefully");
        request.request(ShutdownReason::Signal);

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        warn!("received a second signal, terminating immediately");
        std::process::exit(1);
    });
}

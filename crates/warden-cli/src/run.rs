//! Assembles C1-C8 from a configuration directory and drives the daemon
//! until shutdown (§4, §5, §6). Grounded on
//! `kimberlite-cli::commands::start::run`'s shape: resolve paths, open
//! state, print a startup banner, then hand off to a long-running
//! signal-aware server loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use warden_api::AppState;
use warden_checks::CheckEngine;
use warden_config::Paths;
use warden_overlord::Overlord;
use warden_reaper::Reaper;
use warden_store::Store;
use warden_supervisor::Supervisor;

use crate::exit_code::{ExitCode, ShutdownReason, ShutdownRequest};
use crate::{signals, watchdog};

/// Deadline for "stop all services in reverse dependency order" (§5) before
/// the daemon gives up waiting and proceeds to exit anyway.
const STOP_DEADLINE: Duration = Duration::from_secs(30);

pub async fn run(paths: Paths) -> anyhow::Result<ExitCode> {
    let layers = warden_api::layers_fs::load_layers(&paths.layers_dir()).context("failed to load plan layers")?;
    let plan = Arc::new(warden_plan::combine(&layers).context("failed to combine plan layers")?);
    let identity = warden_config::load_identity(&paths.identity_file()).context("failed to load identity file")?;

    info!(dir = %paths.dir().display(), socket = %paths.socket_path().display(), services = plan.services.len(), checks = plan.checks.len(), "starting wardend");

    let snapshot_path: PathBuf = if Paths::persist_enabled() {
        paths.state_file()
    } else {
        PathBuf::from("/dev/null")
    };
    let store = Arc::new(Store::load(snapshot_path).context("failed to load state store")?);

    let reaper = Reaper::install().context("failed to install as child-subreaper")?;
    let notice_store = store.clone();
    let log_drop_raiser: warden_supervisor::NoticeRaiser = Arc::new(move |service| {
        let key = format!("log-forwarder-drop:{service}");
        if let Err(err) = notice_store.raise_notice(warden_types::NoticeType::Warning, key, Duration::from_secs(60)) {
            warn!(%service, %err, "failed to raise log-forwarder-drop notice");
        }
    });
    let supervisor = Arc::new(Supervisor::new(reaper.clone()).with_log_forwarding(4000).with_notice_raiser(log_drop_raiser));
    let checks = Arc::new(CheckEngine::new(reaper.clone(), store.clone()));
    let overlord = Arc::new(Overlord::new(store.clone(), supervisor.clone(), checks.clone(), reaper.clone(), plan));

    overlord.enqueue_autostart().context("failed to enqueue autostart")?;
    overlord.enqueue_check_autostart().context("failed to enqueue check autostart")?;

    let state = Arc::new(AppState::new(
        store.clone(),
        supervisor.clone(),
        checks.clone(),
        overlord.clone(),
        identity,
        paths.layers_dir(),
        layers,
    ));

    let (request, mut reason_rx) = ShutdownRequest::new();
    signals::install(request.clone());
    tokio::spawn(watchdog::run(overlord.clone(), supervisor.clone(), checks.clone(), request.clone()));

    let (work_shutdown_tx, work_shutdown_rx) = watch::channel(false);
    let overlord_task = tokio::spawn({
        let overlord = overlord.clone();
        let rx = work_shutdown_rx.clone();
        async move { overlord.run(rx).await }
    });

    let socket_path = paths.socket_path().to_path_buf();
    let mut api_task = tokio::spawn({
        let state = state.clone();
        let mut rx = work_shutdown_rx.clone();
        async move {
            warden_api::serve(socket_path, state, async move {
                let _ = rx.wait_for(|v| *v).await;
            })
            .await
        }
    });

    info!("wardend is running, press Ctrl+C to stop");

    let mut api_already_done = false;
    tokio::select! {
        _ = reason_rx.wait_for(Option::is_some) => {}
        res = &mut api_task => {
            api_already_done = true;
            match res {
                Ok(Ok(())) => request.request(ShutdownReason::Signal),
                Ok(Err(err)) => {
                    warn!(%err, "api listener exited unexpectedly");
                    request.request(ShutdownReason::SocketRestart);
                }
                Err(err) => {
                    warn!(%err, "api listener task panicked");
                    request.request(ShutdownReason::SocketRestart);
                }
            }
        }
    }

    let _ = reason_rx.wait_for(Option::is_some).await;
    let reason = (*reason_rx.borrow()).expect("a branch above always sets a reason before reaching here");
    info!(?reason, "shutting wardend down");

    graceful_stop(&store, &overlord, &supervisor, &checks).await;

    let _ = work_shutdown_tx.send(true);
    let _ = overlord_task.await;
    if !api_already_done {
        if let Ok(Err(err)) = api_task.await {
            warn!(%err, "api listener exited with an error during shutdown");
        }
    }

    Ok(reason.exit_code())
}

/// §5 "stop all services in reverse dependency order, deadline bounded;
/// then stop check loops". The work loop is still running at this point
/// (it only stops once `work_shutdown_tx` is flipped, after this
/// function returns), so the stop change it dispatches here actually runs.
async fn graceful_stop(store: &Store, overlord: &Overlord, supervisor: &Supervisor, checks: &CheckEngine) {
    let names = supervisor.names();
    if !names.is_empty() {
        match overlord.enqueue_stop(names) {
            Ok(change) => {
                if tokio::time::timeout(STOP_DEADLINE, store.wait_for_change_ready(change.id)).await.is_err() {
                    warn!("graceful stop deadline elapsed, some services may still be running");
                }
            }
            Err(err) => warn!(%err, "failed to enqueue shutdown stop"),
        }
    }

    for name in overlord.current_plan().checks.keys() {
        let _ = checks.stop(name).await;
    }
}

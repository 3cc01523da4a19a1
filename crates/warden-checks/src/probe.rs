//! The three probe kinds (§4.5). Each returns `Ok(())` on success or
//! `Err(reason)` describing why the probe failed, within the check's
//! configured `timeout`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use warden_plan::ProbeSpec;
use warden_reaper::Reaper;
use warden_types::CheckName;

use crate::log::CheckLog;

pub async fn run(
    check: &CheckName,
    log: &Arc<CheckLog>,
    spec: &ProbeSpec,
    timeout: Duration,
    reaper: &Reaper,
    http_client: &reqwest::Client,
) -> Result<(), String> {
    let probe = match spec {
        ProbeSpec::Http { url, headers } => run_http(url, headers, timeout, http_client),
        ProbeSpec::Tcp { host, port } => run_tcp(host, *port, timeout),
        ProbeSpec::Exec {
            command,
            environment,
            working_dir,
            user: _,
            group: _,
        } => run_exec(check, log, command, environment, working_dir.as_deref(), timeout, reaper),
    };
    probe.await
}

async fn run_http(url: &str, headers: &std::collections::BTreeMap<String, String>, timeout: Duration, client: &reqwest::Client) -> Result<(), String> {
    let mut request = client.get(url).timeout(timeout);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| "timed out".to_string())?
        .map_err(|err| err.to_string())?;

    let status = response.status();
    if (200..400).contains(&status.as_u16()) {
        Ok(())
    } else {
        Err(format!("unexpected status {status}"))
    }
}

async fn run_tcp(host: &str, port: u16, timeout: Duration) -> Result<(), String> {
    tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port)))
        .await
        .map_err(|_| "timed out".to_string())?
        .map(|_| ())
        .map_err(|err| err.to_string())
}

async fn run_exec(
    check: &CheckName,
    log: &Arc<CheckLog>,
    command: &[String],
    environment: &std::collections::BTreeMap<String, String>,
    working_dir: Option<&str>,
    timeout: Duration,
    reaper: &Reaper,
) -> Result<(), String> {
    let [program, args @ ..] = command else {
        return Err("empty command".to_string());
    };

    let mut builder = Command::new(program);
    builder.args(args).envs(environment).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        builder.current_dir(dir);
    }

    let mut guard = reaper.spawn_guard();
    let mut child = builder.spawn().map_err(|err| err.to_string())?;
    let pid = child.id().ok_or("spawned process has no pid")? as i32;
    let rx = guard.register(pid);
    drop(guard);

    crate::log::spawn_readers(check.clone(), log.clone(), child.stdout.take(), child.stderr.take());
    drop(child); // the reaper owns reaping this pid from here on

    let code = tokio::time::timeout(timeout, rx).await.map_err(|_| "timed out".to_string())?;
    match code {
        Ok(code) if code.0 == 0 => Ok(()),
        Ok(code) => Err(format!("exited with code {}", code.0)),
        Err(_) => Err("reaper channel closed before exit".to_string()),
    }
}

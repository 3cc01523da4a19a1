//! Bounded stdout/stderr tail for exec probes, mirroring
//! `warden_supervisor::log::ServiceLog`'s ring but without a forwarding
//! queue: a check's output only ever needs to be tailed back through the
//! API, never shipped anywhere.

use std::sync::Mutex;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tracing::warn;
use warden_types::{CheckName, RingBuffer};

/// Small tail; an exec probe's output is diagnostic, not a service's full
/// log stream.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

pub struct CheckLog {
    tail: Mutex<RingBuffer<String>>,
}

impl CheckLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            tail: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    pub fn tail(&self) -> Vec<String> {
        self.tail.lock().expect("check log ring poisoned").iter().cloned().collect()
    }

    fn push(&self, line: String) {
        self.tail.lock().expect("check log ring poisoned").push(line);
    }
}

/// Spawn the two reader tasks that drain an exec probe's stdio into `log`.
/// Consumes the pipes so nothing else can read them.
pub fn spawn_readers(check: CheckName, log: std::sync::Arc<CheckLog>, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
    if let Some(stdout) = stdout {
        let log = log.clone();
        let check = check.clone();
        tokio::spawn(async move { drain(check, stdout, log).await });
    }
    if let Some(stderr) = stderr {
        tokio::spawn(async move { drain(check, stderr, log).await });
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(check: CheckName, reader: R, log: std::sync::Arc<CheckLog>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log.push(line),
            Ok(None) => return,
            Err(err) => {
                warn!(%check, error = %err, "check log reader failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_past_capacity_drops_oldest() {
        let log = CheckLog::new(2);
        log.push("a".into());
        log.push("b".into());
        log.push("c".into());
        assert_eq!(log.tail(), vec!["b".to_string(), "c".to_string()]);
    }
}

//! Per-service log capture (§C "Log ring buffer"): stdout/stderr are read
//! line-by-line into a bounded ring, and mirrored onto a bounded forwarding
//! queue when the service names log targets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tracing::warn;
use warden_types::{RingBuffer, ServiceName};

use crate::bounded_queue::{BoundedQueue, PushResult};

/// Default per-service log tail, matching the order of magnitude of
/// Pebble's own default ring size.
pub const DEFAULT_LOG_CAPACITY: usize = 4000;

/// Raises a notice when a service's forwarding queue drops a line.
/// Decoupled as a callback rather than a `warden_store` dependency so this
/// crate doesn't need to know about the store's notice API; the real
/// closure (calling `Store::raise_notice`) is supplied by the binary that
/// owns both.
pub type NoticeRaiser = Arc<dyn Fn(&ServiceName) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LogLine {
    pub service: ServiceName,
    pub stream: Stream,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Shared log state for one service: the ring tail callers read back via
/// the API, plus the forwarding queue background log-shipping drains.
pub struct ServiceLog {
    tail: Mutex<RingBuffer<String>>,
    forward: Option<Arc<BoundedQueue<LogLine>>>,
    notice_raiser: Option<NoticeRaiser>,
    dropped: AtomicU64,
}

impl ServiceLog {
    pub fn new(capacity: usize, forward: Option<Arc<BoundedQueue<LogLine>>>, notice_raiser: Option<NoticeRaiser>) -> Self {
        Self {
            tail: Mutex::new(RingBuffer::new(capacity)),
            forward,
            notice_raiser,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn tail(&self) -> Vec<String> {
        self.tail.lock().expect("log ring poisoned").iter().cloned().collect()
    }

    /// Lines dropped for backpressure on the forwarding queue (§C), since
    /// the daemon started or was last restarted.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, service: &ServiceName, stream: Stream, line: String) {
        self.tail.lock().expect("log ring poisoned").push(line.clone());
        if let Some(queue) = &self.forward {
            let entry = LogLine {
                service: service.clone(),
                stream,
                line,
            };
            if let PushResult::Backpressure(_) = queue.try_push(entry) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%service, "log forwarding queue is full, dropping line");
                if let Some(raiser) = &self.notice_raiser {
                    raiser(service);
                }
            }
        }
    }
}

/// Spawn the two reader tasks that drain a freshly-started child's stdio
/// into `log`. Consumes the pipes so nothing else can read them.
pub fn spawn_readers(service: ServiceName, log: Arc<ServiceLog>, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
    if let Some(stdout) = stdout {
        let service = service.clone();
        let log = log.clone();
        tokio::spawn(async move { drain(service, Stream::Stdout, stdout, log).await });
    }
    if let Some(stderr) = stderr {
        tokio::spawn(async move { drain(service, Stream::Stderr, stderr, log).await });
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(service: ServiceName, stream: Stream, reader: R, log: Arc<ServiceLog>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log.push(&service, stream, line),
            Ok(None) => return,
            Err(err) => {
                warn!(%service, ?stream, error = %err, "log reader failed");
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
        let log = ServiceLog::new(2, None, None);
        let name = ServiceName::new("web");
        log.push(&name, Stream::Stdout, "a".into());
        log.push(&name, Stream::Stdout, "b".into());
        log.push(&name, Stream::Stdout, "c".into());
        assert_eq!(log.tail(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn full_forward_queue_drops_without_panicking() {
        let queue = Arc::new(BoundedQueue::new(1));
        let log = ServiceLog::new(10, Some(queue.clone()), None);
        let name = ServiceName::new("web");
        log.push(&name, Stream::Stdout, "first".into());
        log.push(&name, Stream::Stdout, "second".into());
        assert_eq!(queue.len(), 1);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn full_forward_queue_raises_a_notice_via_the_configured_callback() {
        let queue = Arc::new(BoundedQueue::new(1));
        let raised = Arc::new(AtomicU64::new(0));
        let counter = raised.clone();
        let raiser: NoticeRaiser = Arc::new(move |_service| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let log = ServiceLog::new(10, Some(queue), Some(raiser));
        let name = ServiceName::new("web");
        log.push(&name, Stream::Stdout, "first".into());
        log.push(&name, Stream::Stdout, "second".into());
        assert_eq!(raised.load(Ordering::Relaxed), 1);
    }
}

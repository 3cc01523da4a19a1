//! Shared vocabulary for the warden service manager.
//!
//! Every crate in the workspace depends on this one for identifiers and
//! small enums that cross component boundaries (plan, store, supervisor,
//! checks, overlord, api). Nothing here does I/O or holds a lock; these are
//! plain values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Name of a service as it appears in a plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

/// Name of a check as it appears in a plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckName(String);

/// Label of a configuration layer (unique within a plan).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerLabel(String);

macro_rules! string_newtype {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(ServiceName);
string_newtype!(CheckName);
string_newtype!(LayerLabel);

/// Monotonically increasing identifier, rendered as a decimal string on the
/// wire (§3: "Change: identifier (monotonic decimal string)").
macro_rules! decimal_id {
    ($ty:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $ty(u64);

        impl $ty {
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

decimal_id!(ChangeId);
decimal_id!(TaskId);
decimal_id!(NoticeId);

/// Signal a service or exec process can be sent (§4.4 `signal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Sighup,
    Sigint,
    Sigquit,
    Sigterm,
    Sigkill,
    Sigusr1,
    Sigusr2,
    Sigcont,
    Sigstop,
}

impl Signal {
    /// Raw POSIX signal number, for `kill(2)`.
    pub fn number(self) -> i32 {
        match self {
            Signal::Sighup => libc::SIGHUP,
            Signal::Sigint => libc::SIGINT,
            Signal::Sigquit => libc::SIGQUIT,
            Signal::Sigterm => libc::SIGTERM,
            Signal::Sigkill => libc::SIGKILL,
            Signal::Sigusr1 => libc::SIGUSR1,
            Signal::Sigusr2 => libc::SIGUSR2,
            Signal::Sigcont => libc::SIGCONT,
            Signal::Sigstop => libc::SIGSTOP,
        }
    }
}

impl FromStr for Signal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SIGHUP" | "HUP" => Ok(Signal::Sighup),
            "SIGINT" | "INT" => Ok(Signal::Sigint),
            "SIGQUIT" | "QUIT" => Ok(Signal::Sigquit),
            "SIGTERM" | "TERM" => Ok(Signal::Sigterm),
            "SIGKILL" | "KILL" => Ok(Signal::Sigkill),
            "SIGUSR1" | "USR1" => Ok(Signal::Sigusr1),
            "SIGUSR2" | "USR2" => Ok(Signal::Sigusr2),
            "SIGCONT" | "CONT" => Ok(Signal::Sigcont),
            "SIGSTOP" | "STOP" => Ok(Signal::Sigstop),
            other => Err(UnknownSignal(other.to_string())),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Sighup => "SIGHUP",
            Signal::Sigint => "SIGINT",
            Signal::Sigquit => "SIGQUIT",
            Signal::Sigterm => "SIGTERM",
            Signal::Sigkill => "SIGKILL",
            Signal::Sigusr1 => "SIGUSR1",
            Signal::Sigusr2 => "SIGUSR2",
            Signal::Sigcont => "SIGCONT",
            Signal::Sigstop => "SIGSTOP",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown signal name: {0}")]
pub struct UnknownSignal(pub String);

/// §4.4 state machine for a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Initial,
    Starting,
    Running,
    Backoff,
    Stopping,
    Stopped,
    Terminated,
    Exited,
}

impl ServiceState {
    pub fn is_running_like(self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Initial => "initial",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Backoff => "backoff",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Terminated => "terminated",
            ServiceState::Exited => "exited",
        };
        write!(f, "{s}")
    }
}

/// §4.5 state machine for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Up,
    Down,
    Inactive,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

/// §3 `CheckLevel`: `alive` | `ready` | unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckLevel {
    Alive,
    Ready,
}

/// §3 Change/Task status. Shared because a Change's status is an aggregate
/// of its Tasks' statuses (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Do,
    Doing,
    Done,
    Abort,
    Undo,
    Undoing,
    Hold,
    Error,
}

impl Status {
    /// Terminal statuses make a Change/Task "ready" (§3, §8 invariant).
    /// `Hold` is deliberately excluded: it's a waypoint on the cancellation
    /// path (§4.6 "`Hold`→`Undo`"), not a resting state, so a Change isn't
    /// considered ready until a held task has actually been resolved
    /// (`Undo`/`Undoing` → `Done`/`Error`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Abort | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Do => "Do",
            Status::Doing => "Doing",
            Status::Done => "Done",
            Status::Abort => "Abort",
            Status::Undo => "Undo",
            Status::Undoing => "Undoing",
            Status::Hold => "Hold",
            Status::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// §3 Change kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Start,
    Stop,
    Restart,
    Replan,
    Autostart,
    PerformCheck,
    RecoverCheck,
    Exec,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Start => "start",
            ChangeKind::Stop => "stop",
            ChangeKind::Restart => "restart",
            ChangeKind::Replan => "replan",
            ChangeKind::Autostart => "autostart",
            ChangeKind::PerformCheck => "perform-check",
            ChangeKind::RecoverCheck => "recover-check",
            ChangeKind::Exec => "exec",
        };
        write!(f, "{s}")
    }
}

/// §4.9 / §9 task-kind registry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    StartService,
    StopService,
    RestartService,
    RunCheck,
    RecoverCheck,
    Exec,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::StartService => "start-service",
            TaskKind::StopService => "stop-service",
            TaskKind::RestartService => "restart-service",
            TaskKind::RunCheck => "run-check",
            TaskKind::RecoverCheck => "recover-check",
            TaskKind::Exec => "exec",
        };
        write!(f, "{s}")
    }
}

/// §3 Notice type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeType {
    ChangeUpdate,
    Warning,
    Custom,
}

/// §3 restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    OnSuccess,
    OnFailure,
    Never,
}

/// §3 startup mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartupMode {
    Enabled,
    Disabled,
}

/// §4.1 layer override mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideMode {
    Replace,
    Merge,
}

/// §3 on-check-failure action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnCheckFailureAction {
    Restart,
    Shutdown,
    Ignore,
}

/// §3 Identity access level, consulted by the API's auth layer only —
/// inside the core, identities never appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Metrics,
    Read,
    Admin,
}

/// §6 API error envelope `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    LoginRequired,
    PermissionDenied,
    NoDefaultServices,
    SystemRestart,
    NotFound,
    Generic,
}

/// A fixed-capacity FIFO used for per-task and per-service log tails
/// (§3 "lazy logs (ring-bounded)"; SUPPLEMENTED DETAIL "log ring buffer").
/// Pushing past capacity silently drops the oldest line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    capacity: usize,
    buf: std::collections::VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buf: std::collections::VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_id_formats_as_decimal() {
        assert_eq!(ChangeId::new(147).to_string(), "147");
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let mut ring: RingBuffer<u32> = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn signal_round_trips_through_name() {
        for sig in [Signal::Sigterm, Signal::Sigkill, Signal::Sighup] {
            let parsed: Signal = sig.to_string().parse().unwrap();
            assert_eq!(parsed, sig);
        }
    }

    #[test]
    fn status_terminal_classification_matches_spec() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Do.is_terminal());
        assert!(!Status::Doing.is_terminal());
    }
}

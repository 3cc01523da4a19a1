//! Per-service state machine, spawn/stop protocol, backoff, and log
//! capture (§4.4, C4).

mod bounded_queue;
mod error;
mod log;
mod process;
mod supervisor;

pub use bounded_queue::{BoundedQueue, PushResult};
pub use error::{SupervisorError, SupervisorResult};
pub use log::{LogLine, NoticeRaiser};
pub use supervisor::Supervisor;

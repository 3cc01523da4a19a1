//! Child-subreaper and `SIGCHLD` drain loop (§4.3, C3).
//!
//! This is the only crate in the workspace permitted `unsafe`: it makes the
//! raw `prctl(2)`/`waitpid(2)` calls a subreaper needs. Everything above it
//! (`warden-supervisor`) talks to it through [`Reaper`] and never touches a
//! syscall directly.

mod error;
mod reaper;

pub use error::{ReaperError, ReaperResult};
pub use reaper::{kill, ExitCode, Reaper, SpawnGuard};

//! The transactional state store (§4.2, C2): Changes, Tasks, Notices, JSON
//! snapshot persistence, and startup crash recovery.
//!
//! Structured as a small functional core ([`state`], [`command`],
//! [`effects`], [`commit`]) wrapped by an imperative shell ([`store`]) that
//! owns the lock and performs IO — the same split `kimberlite-kernel` uses
//! between its pure `kernel`/`state`/`effects` modules and the runtime that
//! executes the effects.

mod command;
mod commit;
mod effects;
mod error;
mod state;
mod store;
mod types;

pub use command::{Command, NewTask};
pub use effects::Effect;
pub use error::{StoreError, StoreResult};
pub use state::State;
pub use store::Store;
pub use types::{Change, DataMap, Notice, Progress, Scope, Task};

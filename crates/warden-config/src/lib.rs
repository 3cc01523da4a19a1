//! Directory/env resolution and identity file loading (ambient stack,
//! SPEC_FULL.md §B.3). Grounded on `kimberlite-config`'s `Paths` type,
//! narrowed to paths and process-level settings — plan content merging
//! stays in `warden-plan` where the per-field replace/merge rules live.

mod error;
mod identity;
mod paths;

pub use error::{ConfigError, ConfigResult};
pub use identity::{hash_password, load_identity, Credential, IdentityEntry, IdentityMap};
pub use paths::Paths;

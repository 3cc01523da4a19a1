//! One module per route group, mirroring the §6 route table.

pub mod changes;
pub mod checks;
pub mod exec;
pub mod health;
pub mod layers;
pub mod metrics;
pub mod notices;
pub mod plan;
pub mod services;
pub mod signals;
pub mod system_info;

//! Shared handler state: handles onto every core component plus the bits
//! the API owns outright (identity, the raw layer stack, metrics).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use warden_checks::CheckEngine;
use warden_config::IdentityMap;
use warden_overlord::Overlord;
use warden_plan::Layer;
use warden_store::Store;
use warden_supervisor::Supervisor;

use crate::metrics::Metrics;
use crate::rate_limit::RateLimiters;

pub struct AppState {
    pub store: Arc<Store>,
    pub supervisor: Arc<Supervisor>,
    pub checks: Arc<CheckEngine>,
    pub overlord: Arc<Overlord>,
    pub identity: IdentityMap,
    pub layers_dir: PathBuf,
    pub layers: Mutex<Vec<Layer>>,
    pub metrics: Metrics,
    pub rate_limiters: RateLimiters,
    pub boot_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        supervisor: Arc<Supervisor>,
        checks: Arc<CheckEngine>,
        overlord: Arc<Overlord>,
        identity: IdentityMap,
        layers_dir: PathBuf,
        layers: Vec<Layer>,
    ) -> Self {
        let started_at = chrono::Utc::now();
        Self {
            store,
            supervisor,
            checks,
            overlord,
            identity,
            layers_dir,
            layers: Mutex::new(layers),
            metrics: Metrics::new(),
            rate_limiters: RateLimiters::new(),
            boot_id: format!("{:x}-{}", std::process::id(), started_at.timestamp()),
            started_at,
        }
    }
}

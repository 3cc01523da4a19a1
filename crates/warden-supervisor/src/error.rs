use warden_types::ServiceName;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("service {0} is not known to this supervisor")]
    UnknownService(ServiceName),

    #[error("service {service} is not running")]
    NotRunning { service: ServiceName },

    #[error("failed to spawn service {service}: {source}")]
    Spawn {
        service: ServiceName,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal service {service}: {source}")]
    Signal {
        service: ServiceName,
        #[source]
        source: std::io::Error,
    },

    #[error("reaper unavailable: {0}")]
    Reaper(#[from] warden_reaper::ReaperError),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Debug, thiserror::Error)]
pub enum OverlordError {
    #[error(transparent)]
    Planner(#[from] warden_planner::PlannerError),
    #[error(transparent)]
    Store(#[from] warden_store::StoreError),
}

pub type OverlordResult<T> = Result<T, OverlordError>;

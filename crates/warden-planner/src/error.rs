#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// Should not occur against a plan that already passed `warden_plan`'s
    /// validation, which rejects cycles up front; kept as a defensive
    /// result rather than a panic since the planner is handed an arbitrary
    /// `&Plan`.
    #[error("dependency graph contains a cycle the planner cannot order")]
    Cycle,
}

pub type PlannerResult<T> = Result<T, PlannerError>;

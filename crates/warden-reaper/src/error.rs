#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("PR_SET_CHILD_SUBREAPER failed: {0}")]
    SubreaperUnavailable(#[source] std::io::Error),

    #[error("failed to install SIGCHLD handler: {0}")]
    SignalUnavailable(#[source] std::io::Error),
}

pub type ReaperResult<T> = Result<T, ReaperError>;

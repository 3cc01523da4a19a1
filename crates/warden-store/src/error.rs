use warden_types::{ChangeId, NoticeId, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("change {0} not found")]
    ChangeNotFound(ChangeId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("notice {0} not found")]
    NoticeNotFound(NoticeId),

    #[error("failed to persist snapshot to {path}: {source}")]
    SnapshotWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read snapshot from {path}: {source}")]
    SnapshotRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot at {path} is corrupt: {source}")]
    SnapshotDecode {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

use taskwright_utils::error::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {project}")]
    ProjectNotFound { project: String },

    #[error("taskset already exists: {project}/{path}")]
    AlreadyExists { project: String, path: String },

    #[error("taskset not found: {project}/{path}")]
    TaskSetNotFound { project: String, path: String },

    #[error("task not found: {uuid}")]
    TaskNotFound { uuid: String },

    #[error("taskset file is corrupt: {project}/{path}: {source}")]
    Corrupt {
        project: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("lock error: {0}")]
    Lock(#[from] taskwright_lock::LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

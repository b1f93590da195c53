use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("report manifest {0:?} is not valid JSON: {1}")]
    MalformedManifest(String, String),

    #[error(transparent)]
    Store(#[from] taskwright_store::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("project not found: {project}")]
    ProjectNotFound { project: String },

    #[error("project {project} has no disclaimer template configured")]
    DisclaimerMissing { project: String },

    #[error("project {project} disclaimer template {path:?} is invalid: {reason}")]
    DisclaimerInvalid {
        project: String,
        path: String,
        reason: String,
    },

    #[error("template {path:?} referenced by taskset {taskset:?} could not be loaded: {source}")]
    TemplateUnavailable {
        taskset: String,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] taskwright_store::StoreError),

    #[error(transparent)]
    Prompt(#[from] taskwright_prompt::PromptError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

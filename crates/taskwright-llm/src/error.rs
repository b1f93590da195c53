use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to launch {llm_id}: {source}")]
    Spawn {
        llm_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{llm_id} was killed before completing: {reason}")]
    KilledBeforeExit { llm_id: String, reason: String },

    #[error("{llm_id} timed out after {duration:?}")]
    Timeout { llm_id: String, duration: Duration },

    #[error("{llm_id} binary not found: {0}", .source)]
    BinaryNotFound {
        llm_id: String,
        #[source]
        source: which::Error,
    },
}

impl LlmError {
    /// Every variant here is the spec's `InfrastructureError` shape: the
    /// subprocess could not be launched, or was killed before it exited.
    /// A non-zero exit code is NOT an `LlmError` — it is a normal
    /// [`DispatchResult`](crate::DispatchResult) the engine interprets.
    pub fn llm_id(&self) -> &str {
        match self {
            LlmError::Spawn { llm_id, .. }
            | LlmError::KilledBeforeExit { llm_id, .. }
            | LlmError::Timeout { llm_id, .. }
            | LlmError::BinaryNotFound { llm_id, .. } => llm_id,
        }
    }
}

//! Default `LlmDispatcher`: spawns a configured binary per LLM id, feeds
//! the prompt on stdin, and collects stdout/stderr under a timeout.

use crate::dispatcher::{DispatchRequest, DispatchResult, LlmDispatcher};
use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Maps an LLM id to the binary invoked for it, plus any fixed arguments
/// the CLI needs (e.g. `--print`, `--output-format json`).
#[derive(Debug, Clone)]
pub struct LlmBinaryConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

pub struct SubprocessDispatcher {
    binaries: HashMap<String, LlmBinaryConfig>,
}

impl SubprocessDispatcher {
    pub fn new(binaries: HashMap<String, LlmBinaryConfig>) -> Self {
        Self { binaries }
    }

    /// Resolve `llm_id`'s binary via PATH if no explicit config entry
    /// exists, matching the teacher's fall-back-to-`which` convention.
    pub fn resolve_or_discover(&self, llm_id: &str) -> Result<LlmBinaryConfig, LlmError> {
        if let Some(cfg) = self.binaries.get(llm_id) {
            return Ok(cfg.clone());
        }
        let binary = which::which(llm_id).map_err(|source| LlmError::BinaryNotFound {
            llm_id: llm_id.to_string(),
            source,
        })?;
        Ok(LlmBinaryConfig {
            binary,
            args: Vec::new(),
        })
    }
}

#[async_trait]
impl LlmDispatcher for SubprocessDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, LlmError> {
        let cfg = self.resolve_or_discover(&request.llm_id)?;

        debug!(llm_id = %request.llm_id, binary = %cfg.binary.display(), "dispatching LLM invocation");

        let mut child = Command::new(&cfg.binary)
            .args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LlmError::Spawn {
                llm_id: request.llm_id.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(source) = stdin.write_all(request.prompt.as_bytes()).await {
                warn!(llm_id = %request.llm_id, %source, "failed writing prompt to subprocess stdin");
            }
        }

        let outcome = tokio::time::timeout(request.timeout, child.wait_with_output()).await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(LlmError::KilledBeforeExit {
                    llm_id: request.llm_id.clone(),
                    reason: source.to_string(),
                });
            }
            Err(_) => {
                return Err(LlmError::Timeout {
                    llm_id: request.llm_id.clone(),
                    duration: request.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr_raw = String::from_utf8_lossy(&output.stderr).into_owned();
        let stderr = taskwright_redaction::redact(&stderr_raw).unwrap_or(stderr_raw);

        Ok(DispatchResult::new(
            stdout,
            stderr,
            output.status.code().unwrap_or(-1),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_binary_not_found_for_unknown_llm_id() {
        let dispatcher = SubprocessDispatcher::new(HashMap::new());
        let request = DispatchRequest {
            llm_id: "definitely-not-a-real-binary-xyz".to_string(),
            prompt: "hello".to_string(),
            timeout: Duration::from_secs(1),
        };
        let err = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(err, LlmError::BinaryNotFound { .. }));
    }

    #[tokio::test]
    async fn runs_configured_binary_and_captures_output() {
        let mut binaries = HashMap::new();
        binaries.insert(
            "echo-model".to_string(),
            LlmBinaryConfig {
                binary: PathBuf::from("/bin/cat"),
                args: Vec::new(),
            },
        );
        let dispatcher = SubprocessDispatcher::new(binaries);
        let request = DispatchRequest {
            llm_id: "echo-model".to_string(),
            prompt: r#"{"verdict": "pass"}"#.to_string(),
            timeout: Duration::from_secs(5),
        };
        let result = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("\"verdict\""));
    }
}

//! The `LLMDispatcher` collaborator: runs a subprocess for one LLM
//! invocation and returns its raw output. The engine never parses stdout
//! itself — it hands the result straight to
//! `taskwright_schema::extract_json`.

use crate::error::LlmError;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub llm_id: String,
    pub prompt: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub response_size: usize,
}

impl DispatchResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        let response_size = stdout.len();
        Self {
            stdout,
            stderr,
            exit_code,
            response_size,
        }
    }
}

#[async_trait]
pub trait LlmDispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, LlmError>;
}

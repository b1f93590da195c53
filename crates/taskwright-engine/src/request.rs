//! Request/result DTOs for the tool-protocol surface the engine exposes.
//! No transport assumption: these are plain structs a façade translates
//! to and from whatever wire format it speaks.

use std::time::Duration;
use taskwright_store::{ResetMode, ResultFile, TaskStatus};

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project: String,
    pub path_prefix: Option<String>,
    pub task_type: Option<String>,
    pub parallel: Option<bool>,
    pub timeout: Duration,
    /// If `false`, `Engine::run` returns as soon as admission succeeds and
    /// drives the round loop in the background.
    pub wait: bool,
}

impl RunRequest {
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            path_prefix: None,
            task_type: None,
            parallel: None,
            timeout: Duration::from_secs(120),
            wait: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub project: String,
    pub path: Option<String>,
    pub tasks_found: usize,
    pub tasks_executed: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
    pub aborted: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct TaskStatusRequest {
    pub project: String,
    pub path_prefix: Option<String>,
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskStatusResult {
    pub waiting: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    pub retry: usize,
    pub superseded: usize,
    pub run_in_progress: bool,
}

#[derive(Debug, Clone)]
pub struct ResultsRequest {
    pub project: String,
    pub path_prefix: Option<String>,
    pub task_id: Option<u32>,
    pub status: Option<TaskStatus>,
    pub offset: usize,
    pub limit: usize,
    pub summary: bool,
    pub worker_pattern: Option<String>,
    pub qa_pattern: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    pub total: usize,
    pub items: Vec<ResultFile>,
}

#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub project: String,
    pub path: String,
    pub mode: ResetMode,
    pub delete_results: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResetResult {
    pub tasks_reset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
    pub ok: bool,
}

//! On-disk data model: tasksets, tasks, and their two phases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskwright_utils::collab::ContentSource as CollabContentSource;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Processing,
    Done,
    Failed,
    Retry,
    Superseded,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionsSource {
    Project,
    Playbook,
    Reference,
}

impl From<InstructionsSource> for CollabContentSource {
    fn from(value: InstructionsSource) -> Self {
        match value {
            InstructionsSource::Project => CollabContentSource::Project,
            InstructionsSource::Playbook => CollabContentSource::Playbook,
            InstructionsSource::Reference => CollabContentSource::Reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Escalate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    pub status: TaskStatus,
    #[serde(default)]
    pub invocations: u32,
    #[serde(default)]
    pub infra_retries: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub instructions_file: Option<String>,
    #[serde(default)]
    pub instructions_file_source: Option<InstructionsSource>,
    #[serde(default)]
    pub instructions_text: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub llm_model_id: Option<String>,
}

impl Work {
    pub fn waiting() -> Self {
        Self {
            status: TaskStatus::Waiting,
            invocations: 0,
            infra_retries: 0,
            last_attempt_at: None,
            error: None,
            instructions_file: None,
            instructions_file_source: None,
            instructions_text: None,
            prompt: None,
            llm_model_id: None,
        }
    }

    /// At least one of `instructions_file`, `instructions_text`, `prompt`
    /// must carry content.
    pub fn has_content(&self) -> bool {
        non_empty(&self.instructions_file)
            || non_empty(&self.instructions_text)
            || non_empty(&self.prompt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qa {
    #[serde(default)]
    pub enabled: bool,
    pub status: TaskStatus,
    #[serde(default)]
    pub invocations: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub instructions_file: Option<String>,
    #[serde(default)]
    pub instructions_file_source: Option<InstructionsSource>,
    #[serde(default)]
    pub instructions_text: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub llm_model_id: Option<String>,
}

impl Qa {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            status: TaskStatus::Waiting,
            invocations: 0,
            error: None,
            verdict: None,
            instructions_file: None,
            instructions_file_source: None,
            instructions_text: None,
            prompt: None,
            llm_model_id: None,
        }
    }

    pub fn enabled_waiting() -> Self {
        Self {
            enabled: true,
            ..Self::disabled()
        }
    }
}

fn non_empty(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|s| !s.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub uuid: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub work: Work,
    pub qa: Qa,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_worker")]
    pub max_worker: u32,
    #[serde(default = "default_max_qa")]
    pub max_qa: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_worker() -> u32 {
    3
}
fn default_max_qa() -> u32 {
    2
}
fn default_max_retries() -> u32 {
    3
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_worker: default_max_worker(),
            max_qa: default_max_qa(),
            max_retries: default_max_retries(),
        }
    }
}

impl Limits {
    /// Zero-valued fields fall back to the default, matching the spec's
    /// `WithDefaults` behaviour for partially specified limits.
    pub fn with_defaults(self) -> Self {
        Self {
            max_worker: if self.max_worker == 0 { default_max_worker() } else { self.max_worker },
            max_qa: if self.max_qa == 0 { default_max_qa() } else { self.max_qa },
            max_retries: if self.max_retries == 0 { default_max_retries() } else { self.max_retries },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Templates {
    #[serde(default)]
    pub worker_response_schema: Option<String>,
    #[serde(default)]
    pub worker_report_template: Option<String>,
    #[serde(default)]
    pub qa_response_schema: Option<String>,
    #[serde(default)]
    pub qa_report_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parallel: bool,
    pub limits: Limits,
    #[serde(flatten)]
    pub templates: Templates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskSet {
    pub fn next_task_id(&self) -> u32 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }
}

//! Typed partial-update arguments, replacing the "sparse map of field name
//! to value" the original update calls used: every field a caller might
//! want to change is an explicit `Option<T>`, `Some` meaning "set this",
//! `None` meaning "leave alone".

use crate::domain::{InstructionsSource, Limits, Qa, Task, TaskSet, TaskStatus, Templates, Verdict, Work};

#[derive(Debug, Clone, Default)]
pub struct TaskSetPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub parallel: Option<bool>,
    pub limits: Option<Limits>,
    pub templates: Option<Templates>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkPatch {
    pub status: Option<TaskStatus>,
    pub invocations: Option<u32>,
    pub infra_retries: Option<u32>,
    pub error: Option<String>,
    pub instructions_file: Option<String>,
    pub instructions_file_source: Option<InstructionsSource>,
    pub instructions_text: Option<String>,
    pub prompt: Option<String>,
    pub llm_model_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QaPatch {
    pub enabled: Option<bool>,
    pub status: Option<TaskStatus>,
    pub invocations: Option<u32>,
    pub error: Option<String>,
    pub verdict: Option<Verdict>,
    pub instructions_file: Option<String>,
    pub instructions_file_source: Option<InstructionsSource>,
    pub instructions_text: Option<String>,
    pub prompt: Option<String>,
    pub llm_model_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub task_type: Option<String>,
    pub work: Option<WorkPatch>,
    pub qa: Option<QaPatch>,
}

macro_rules! apply_field {
    ($target:expr, $patch:expr, $field:ident) => {
        if let Some(value) = $patch.$field {
            $target.$field = value;
        }
    };
}

impl TaskSetPatch {
    pub fn apply(self, taskset: &mut TaskSet) {
        apply_field!(taskset, self, title);
        apply_field!(taskset, self, description);
        apply_field!(taskset, self, parallel);
        apply_field!(taskset, self, limits);
        if let Some(templates) = self.templates {
            taskset.templates = templates;
        }
    }
}

impl WorkPatch {
    pub fn apply(self, work: &mut Work) {
        apply_field!(work, self, status);
        apply_field!(work, self, invocations);
        apply_field!(work, self, infra_retries);
        if self.error.is_some() {
            work.error = self.error;
        }
        if self.instructions_file.is_some() {
            work.instructions_file = self.instructions_file;
        }
        apply_field!(work, self, instructions_file_source);
        if self.instructions_text.is_some() {
            work.instructions_text = self.instructions_text;
        }
        if self.prompt.is_some() {
            work.prompt = self.prompt;
        }
        if self.llm_model_id.is_some() {
            work.llm_model_id = self.llm_model_id;
        }
    }
}

impl QaPatch {
    pub fn apply(self, qa: &mut Qa) {
        apply_field!(qa, self, enabled);
        apply_field!(qa, self, status);
        apply_field!(qa, self, invocations);
        if self.error.is_some() {
            qa.error = self.error;
        }
        apply_field!(qa, self, verdict);
        if self.instructions_file.is_some() {
            qa.instructions_file = self.instructions_file;
        }
        apply_field!(qa, self, instructions_file_source);
        if self.instructions_text.is_some() {
            qa.instructions_text = self.instructions_text;
        }
        if self.prompt.is_some() {
            qa.prompt = self.prompt;
        }
        if self.llm_model_id.is_some() {
            qa.llm_model_id = self.llm_model_id;
        }
    }
}

impl TaskPatch {
    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(task_type) = self.task_type {
            task.task_type = task_type;
        }
        if let Some(work) = self.work {
            work.apply(&mut task.work);
        }
        if let Some(qa) = self.qa {
            qa.apply(&mut task.qa);
        }
    }
}

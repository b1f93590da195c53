//! Which tasksets and tasks a report call covers.

use taskwright_store::{Task, TaskStatus, Verdict};

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub path_prefix: Option<String>,
    pub task_type: Option<String>,
    pub work_status: Option<TaskStatus>,
    pub qa_verdict: Option<Verdict>,
}

impl ReportFilter {
    pub(crate) fn matches(&self, task: &Task) -> bool {
        if let Some(task_type) = &self.task_type {
            if &task.task_type != task_type {
                return false;
            }
        }
        if let Some(status) = self.work_status {
            if task.work.status != status {
                return false;
            }
        }
        if let Some(verdict) = self.qa_verdict {
            if task.qa.verdict != Some(verdict) {
                return false;
            }
        }
        true
    }
}

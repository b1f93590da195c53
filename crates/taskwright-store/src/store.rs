//! The `TaskStore`: load/save tasksets, enforce the name/path grammar,
//! and assign dual IDs (dense sequential + globally unique UUID).

use crate::domain::{Limits, Task, TaskSet, TaskStatus, Templates};
use crate::error::StoreError;
use crate::naming;
use crate::patch::{TaskPatch, TaskSetPatch};
use crate::result::delete_result_artifacts;
use camino::Utf8PathBuf;
use chrono::Utc;
use std::fs;
use taskwright_utils::atomic_write::write_text_atomic;
use taskwright_utils::collab::{ContentSource, ContentStore};
use taskwright_utils::paths::ensure_dir_all;
use tracing::warn;
use uuid::Uuid;

pub struct TaskStore {
    projects_root: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    All,
    Failed,
}

impl TaskStore {
    pub fn new(projects_root: Utf8PathBuf) -> Self {
        Self { projects_root }
    }

    fn tasks_dir(&self, project: &str) -> Utf8PathBuf {
        self.projects_root.join(project).join("tasks")
    }

    pub fn results_dir(&self, project: &str) -> Utf8PathBuf {
        self.projects_root.join(project).join("results")
    }

    fn taskset_file_path(&self, project: &str, path: &str) -> Utf8PathBuf {
        self.tasks_dir(project).join(naming::path_to_filename(path))
    }

    fn read_taskset_from_disk(&self, project: &str, path: &str) -> Result<TaskSet, StoreError> {
        let file_path = self.taskset_file_path(project, path);
        let body =
            fs::read_to_string(file_path.as_std_path()).map_err(|_| StoreError::TaskSetNotFound {
                project: project.to_string(),
                path: path.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|source| StoreError::Corrupt {
            project: project.to_string(),
            path: path.to_string(),
            source,
        })
    }

    fn write_taskset_to_disk(&self, project: &str, path: &str, taskset: &TaskSet) -> Result<(), StoreError> {
        let file_path = self.taskset_file_path(project, path);
        let body = serde_json::to_string_pretty(taskset).map_err(anyhow::Error::from)?;
        write_text_atomic(&file_path, &body).map_err(anyhow::Error::from)?;
        Ok(())
    }

    fn with_taskset_lock<T>(
        &self,
        project: &str,
        path: &str,
        f: impl FnOnce(&mut TaskSet) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let file_path = self.taskset_file_path(project, path);
        let project = project.to_string();
        let path = path.to_string();
        let store = self;

        taskwright_lock::with_lock(&file_path, move || {
            let mut taskset = store.read_taskset_from_disk(&project, &path)?;
            let result = f(&mut taskset)?;
            taskset.updated_at = Utc::now();
            store.write_taskset_to_disk(&project, &path, &taskset)?;
            Ok(result)
        })
        .map_err(StoreError::from)?
    }

    /// Loads and sanity-checks a taskset's configured QA response schema at
    /// creation time: it must declare a string `verdict` field enumerating
    /// at least pass/fail/escalate. A taskset with no QA schema configured
    /// passes trivially.
    fn validate_qa_response_schema(
        &self,
        content_store: &dyn ContentStore,
        project: &str,
        path: &str,
        qa_response_schema: Option<&str>,
    ) -> Result<(), StoreError> {
        let Some(template) = qa_response_schema else { return Ok(()) };

        let text = content_store
            .load_text(ContentSource::Reference, project, template)
            .map_err(|err| {
                StoreError::Validation(taskwright_utils::error::ValidationError::new(
                    "taskset",
                    path,
                    format!("QA response schema {template:?} could not be loaded: {err}"),
                ))
            })?;
        let schema: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
            StoreError::Validation(taskwright_utils::error::ValidationError::new(
                "taskset",
                path,
                format!("QA response schema {template:?} is not valid JSON: {err}"),
            ))
        })?;
        taskwright_schema::validate_qa_schema(&schema).map_err(|reason| {
            StoreError::Validation(taskwright_utils::error::ValidationError::new("taskset", path, reason))
        })
    }

    pub fn create_taskset(
        &self,
        project: &str,
        path: &str,
        title: String,
        description: String,
        templates: Templates,
        parallel: bool,
        limits: Limits,
        content_store: &dyn ContentStore,
    ) -> Result<TaskSet, StoreError> {
        naming::validate_project_name(project)?;
        naming::validate_taskset_path(path)?;

        let file_path = self.taskset_file_path(project, path);
        if file_path.exists() {
            return Err(StoreError::AlreadyExists {
                project: project.to_string(),
                path: path.to_string(),
            });
        }

        self.validate_qa_response_schema(content_store, project, path, templates.qa_response_schema.as_deref())?;

        ensure_dir_all(&self.tasks_dir(project)).map_err(anyhow::Error::from)?;

        let now = Utc::now();
        let taskset = TaskSet {
            title,
            description,
            parallel,
            limits: limits.with_defaults(),
            templates,
            created_at: now,
            updated_at: now,
            tasks: Vec::new(),
        };

        self.write_taskset_to_disk(project, path, &taskset)?;
        Ok(taskset)
    }

    pub fn get_taskset(&self, project: &str, path: &str) -> Result<TaskSet, StoreError> {
        naming::validate_taskset_path(path)?;
        self.read_taskset_from_disk(project, path)
    }

    /// Enumerates `tasks/*.json`, skips `.lock`, reconstructs each path and
    /// filters by prefix. Corrupt files are logged and skipped rather than
    /// aborting the whole listing.
    pub fn list_tasksets(&self, project: &str, prefix: &str) -> Result<Vec<(String, TaskSet)>, StoreError> {
        let dir = self.tasks_dir(project);
        let mut out = Vec::new();

        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(_) => return Ok(out),
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.ends_with(".json") {
                continue;
            }
            let Some(path) = naming::filename_to_path(file_name) else {
                continue;
            };
            if !path.starts_with(prefix) {
                continue;
            }
            match self.read_taskset_from_disk(project, &path) {
                Ok(taskset) => out.push((path, taskset)),
                Err(err) => {
                    warn!(project, path, %err, "skipping corrupt taskset file during listing");
                }
            }
        }

        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub fn update_taskset(&self, project: &str, path: &str, patch: TaskSetPatch) -> Result<TaskSet, StoreError> {
        self.with_taskset_lock(project, path, move |taskset| {
            patch.apply(taskset);
            Ok(taskset.clone())
        })
    }

    pub fn delete_taskset(&self, project: &str, path: &str) -> Result<(), StoreError> {
        let file_path = self.taskset_file_path(project, path);
        fs::remove_file(file_path.as_std_path())?;
        taskwright_lock::remove_lock_file(&file_path);
        Ok(())
    }

    pub fn create_task(
        &self,
        project: &str,
        path: &str,
        title: String,
        task_type: String,
        work: crate::domain::Work,
        qa: crate::domain::Qa,
    ) -> Result<Task, StoreError> {
        if !work.has_content() {
            return Err(StoreError::Validation(taskwright_utils::error::ValidationError::new(
                "task",
                title.as_str(),
                "requires at least one of instructionsFile, instructionsText, or prompt",
            )));
        }

        self.with_taskset_lock(project, path, move |taskset| {
            let id = taskset.next_task_id();
            let task = Task {
                id,
                uuid: Uuid::now_v7(),
                title,
                task_type,
                work,
                qa,
            };
            taskset.tasks.push(task.clone());
            Ok(task)
        })
    }

    /// Linear scan across every taskset in the project — acceptable given
    /// the expected taskset sizes (see the UUID-lookup design note).
    pub fn get_task(&self, project: &str, uuid: Uuid) -> Result<(Task, String), StoreError> {
        for (path, taskset) in self.list_tasksets(project, "")? {
            if let Some(task) = taskset.tasks.iter().find(|t| t.uuid == uuid) {
                return Ok((task.clone(), path));
            }
        }
        Err(StoreError::TaskNotFound {
            uuid: uuid.to_string(),
        })
    }

    pub fn get_task_by_id(&self, project: &str, path: &str, id: u32) -> Result<Task, StoreError> {
        let taskset = self.get_taskset(project, path)?;
        taskset
            .tasks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound { uuid: format!("id:{id}") })
    }

    pub fn update_task(&self, project: &str, uuid: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        let (_, path) = self.get_task(project, uuid)?;
        self.with_taskset_lock(project, &path, move |taskset| {
            let task = taskset
                .tasks
                .iter_mut()
                .find(|t| t.uuid == uuid)
                .ok_or_else(|| StoreError::TaskNotFound { uuid: uuid.to_string() })?;
            patch.apply(task);
            Ok(task.clone())
        })
    }

    pub fn reset_taskset(
        &self,
        project: &str,
        path: &str,
        mode: ResetMode,
        delete_results: bool,
    ) -> Result<(TaskSet, usize), StoreError> {
        let results_dir = self.results_dir(project);
        let mut reset_uuids = Vec::new();

        let taskset = self.with_taskset_lock(project, path, |taskset| {
            for task in &mut taskset.tasks {
                let work_is_failed = matches!(task.work.status, TaskStatus::Failed);
                let qa_is_failed = task.qa.enabled && matches!(task.qa.status, TaskStatus::Failed);

                let should_reset = match mode {
                    ResetMode::All => true,
                    ResetMode::Failed => work_is_failed || qa_is_failed,
                };

                if !should_reset {
                    continue;
                }

                task.work.invocations = 0;
                task.work.infra_retries = 0;
                task.work.error = None;
                task.work.last_attempt_at = None;
                task.work.status = TaskStatus::Waiting;

                if task.qa.enabled {
                    task.qa.invocations = 0;
                    task.qa.error = None;
                    task.qa.status = TaskStatus::Waiting;
                }

                reset_uuids.push(task.uuid);
            }
            Ok(taskset.clone())
        })?;

        if delete_results {
            for uuid in &reset_uuids {
                delete_result_artifacts(&results_dir, *uuid);
            }
        }

        Ok((taskset, reset_uuids.len()))
    }
}

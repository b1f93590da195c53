//! Assembles markdown reports from a project's tasksets and their result
//! files.
//!
//! A taskset's `worker_report_template` is either a markdown template
//! (the common case, treated as a one-entry manifest targeting the main
//! `Report` suffix) or, when its path ends in `.json`, a manifest of
//! `{suffix, file}` pairs that fan one taskset's tasks out across several
//! report files. Both cases share the same rendering path below.

use crate::error::ReportError;
use crate::filter::ReportFilter;
use crate::session::ReportSession;
use crate::template::{self, ManifestEntry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use taskwright_store::{ResultFile, Task, TaskSet, TaskStore};
use taskwright_utils::collab::{ContentSource, ContentStore, ProjectStore};
use tracing::debug;

pub struct ReportRequest {
    pub project: String,
    pub session: ReportSession,
    pub filter: ReportFilter,
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub markdown: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportResult {
    pub reports: Vec<GeneratedReport>,
}

pub struct Reporter {
    store: Arc<TaskStore>,
    project_store: Arc<dyn ProjectStore>,
    content_store: Arc<dyn ContentStore>,
}

impl Reporter {
    pub fn new(
        store: Arc<TaskStore>,
        project_store: Arc<dyn ProjectStore>,
        content_store: Arc<dyn ContentStore>,
    ) -> Self {
        Self { store, project_store, content_store }
    }

    pub fn build(&self, request: &ReportRequest) -> Result<ReportResult, ReportError> {
        if !self.project_store.project_exists(&request.project) {
            return Err(ReportError::ProjectNotFound(request.project.clone()));
        }

        let disclaimer_text =
            self.load_disclaimer(&request.project, request.session.disclaimer_template.as_deref())?;
        let header = request.session.header(disclaimer_text.as_deref());
        let prefix = request.session.prefix();

        let tasksets = self
            .store
            .list_tasksets(&request.project, request.filter.path_prefix.as_deref().unwrap_or(""))?;
        let results_dir = self.store.results_dir(&request.project);

        let mut template_cache: HashMap<String, String> = HashMap::new();
        let mut sections_by_suffix: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (path, taskset) in &tasksets {
            let Some(template_path) = &taskset.templates.worker_report_template else {
                continue;
            };

            let manifest = self.resolve_manifest(&request.project, template_path)?;
            for entry in &manifest {
                let template_text = self.load_template(&request.project, entry, &mut template_cache)?;
                if let Some(body) =
                    self.render_taskset_section(&request.project, path, taskset, &results_dir, &request.filter, &template_text)
                {
                    sections_by_suffix.entry(entry.suffix.clone()).or_default().push(body);
                }
            }
        }

        let mut result = ReportResult::default();
        for (suffix, sections) in sections_by_suffix {
            let filename = if suffix == "Report" { format!("{prefix}Report.md") } else { format!("{prefix}{suffix}.md") };
            let mut markdown = header.clone();
            markdown.push_str(&sections.join("\n"));
            self.project_store.write_report(&request.project, &filename, &markdown)?;
            result.reports.push(GeneratedReport { filename, markdown });
        }
        Ok(result)
    }

    fn resolve_manifest(&self, project: &str, template_path: &str) -> Result<Vec<ManifestEntry>, ReportError> {
        if template_path.ends_with(".json") {
            let text = self.content_store.load_text(ContentSource::Reference, project, template_path)?;
            template::parse_manifest(&text)
        } else {
            Ok(vec![ManifestEntry { suffix: "Report".to_string(), file: template_path.to_string() }])
        }
    }

    fn load_template(
        &self,
        project: &str,
        entry: &ManifestEntry,
        cache: &mut HashMap<String, String>,
    ) -> Result<String, ReportError> {
        if let Some(cached) = cache.get(&entry.file) {
            return Ok(cached.clone());
        }
        let text = self.content_store.load_text(ContentSource::Reference, project, &entry.file)?;
        cache.insert(entry.file.clone(), text.clone());
        Ok(text)
    }

    /// Renders one taskset's matching tasks through `template_text`,
    /// returning `None` if the taskset contributes nothing (no matching
    /// tasks, or every matching task rendered to an empty block).
    fn render_taskset_section(
        &self,
        project: &str,
        path: &str,
        taskset: &TaskSet,
        results_dir: &camino::Utf8Path,
        filter: &ReportFilter,
        template_text: &str,
    ) -> Option<String> {
        let mut body = String::new();
        for task in &taskset.tasks {
            if !filter.matches(task) {
                continue;
            }
            let Some(rendered) = self.render_task_block(project, path, task, results_dir, template_text) else {
                continue;
            };
            body.push_str(&rendered);
            body.push_str("\n\n---\n\n");
        }
        if body.is_empty() {
            return None;
        }
        Some(format!("## {}\n\n{}", taskset.title, body))
    }

    fn render_task_block(
        &self,
        project: &str,
        path: &str,
        task: &Task,
        results_dir: &camino::Utf8Path,
        template_text: &str,
    ) -> Option<String> {
        let result = match taskwright_store::result::read_result_file(results_dir, task.uuid) {
            Ok(result) => result,
            Err(err) => {
                debug!(project, %path, task_id = task.id, %err, "no result file yet, skipping from report");
                return None;
            }
        };
        let fields = flatten_fields(path, task, &result);
        let rendered = template::render(template_text, &fields);
        if rendered.trim().is_empty() {
            None
        } else {
            Some(rendered)
        }
    }

    fn load_disclaimer(&self, project: &str, template: Option<&str>) -> Result<Option<String>, ReportError> {
        match template {
            None | Some("") | Some("none") => Ok(None),
            Some(path) => {
                let text = self.content_store.load_text(ContentSource::Playbook, project, path)?;
                Ok(Some(text))
            }
        }
    }
}

fn flatten_fields(taskset_path: &str, task: &Task, result: &ResultFile) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("taskset_path".to_string(), taskset_path.to_string());
    fields.insert("task_id".to_string(), task.id.to_string());
    fields.insert("task_uuid".to_string(), task.uuid.to_string());
    fields.insert("task_title".to_string(), task.title.clone());
    fields.insert("task_type".to_string(), task.task_type.clone());
    fields.insert("work_status".to_string(), format!("{:?}", task.work.status).to_lowercase());
    fields.insert("work_error".to_string(), task.work.error.clone().unwrap_or_default());
    fields.insert("prompt".to_string(), result.prompt.clone());
    fields.insert("response".to_string(), result.response.clone());
    fields.insert("supervisor_override".to_string(), result.supervisor_override.to_string());
    let (qa_verdict, qa_prompt, qa_response) = match &result.qa {
        Some(qa) => (qa.verdict.clone(), qa.prompt.clone(), qa.response.clone()),
        None => (String::new(), String::new(), String::new()),
    };
    fields.insert("qa_verdict".to_string(), qa_verdict);
    fields.insert("qa_prompt".to_string(), qa_prompt);
    fields.insert("qa_response".to_string(), qa_response);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;
    use taskwright_store::{Limits, Qa, QaPatch, ResultFile, TaskPatch, Templates, Work, WorkPatch};
    use tempfile::TempDir;

    struct FakeContentStore {
        files: Vec<((ContentSource, String), String)>,
    }

    impl ContentStore for FakeContentStore {
        fn load_text(&self, source: ContentSource, _project: &str, path: &str) -> anyhow::Result<String> {
            self.files
                .iter()
                .find(|((s, p), _)| *s == source && p == path)
                .map(|(_, text)| text.clone())
                .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))
        }
    }

    struct FakeProjectStore {
        reports: Mutex<StdHashMap<String, String>>,
    }

    impl ProjectStore for FakeProjectStore {
        fn project_root(&self, _project: &str) -> anyhow::Result<Utf8PathBuf> {
            unimplemented!()
        }
        fn project_exists(&self, _project: &str) -> bool {
            true
        }
        fn disclaimer_template(&self, _project: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        fn project_context(&self, _project: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        fn append_log_line(&self, _project: &str, _line: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn write_report(&self, _project: &str, filename: &str, markdown: &str) -> anyhow::Result<()> {
            self.reports.lock().unwrap().insert(filename.to_string(), markdown.to_string());
            Ok(())
        }
    }

    fn fixture_session() -> ReportSession {
        ReportSession {
            title: "Nightly".to_string(),
            intro: None,
            issued: Utc.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap(),
            disclaimer_template: None,
        }
    }

    fn done_task(store: &TaskStore, project: &str, path: &str, prompt: &str, response: &str) -> Task {
        let mut work = Work::waiting();
        work.prompt = Some(prompt.to_string());
        let task = store.create_task(project, path, "Check widget".to_string(), "generic".to_string(), work, Qa::disabled()).unwrap();

        store
            .update_task(
                project,
                task.uuid,
                TaskPatch {
                    work: Some(WorkPatch { status: Some(taskwright_store::TaskStatus::Done), ..Default::default() }),
                    qa: Some(QaPatch::default()),
                    ..Default::default()
                },
            )
            .unwrap();

        let results_dir = store.results_dir(project);
        let result = ResultFile {
            task: task.clone(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            qa: None,
            supervisor_override: false,
            history: Vec::new(),
        };
        taskwright_store::result::write_result_file(&results_dir, task.uuid, &result).unwrap();
        task
    }

    #[test]
    fn hierarchical_template_drops_empty_blocks_and_writes_one_report() {
        let dir = TempDir::new().unwrap();
        let projects_root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(projects_root.join("demo")).unwrap();
        let store = Arc::new(TaskStore::new(projects_root));

        store
            .create_taskset("demo", "audit", "Audit".to_string(), String::new(), Templates {
                worker_report_template: Some("templates/worker.md".to_string()),
                ..Default::default()
            }, false, Limits::default(), &FakeContentStore { files: Vec::new() })
            .unwrap();

        done_task(&store, "demo", "audit", "check it", "looks fine");

        // A second task with a prompt/response the template renders to nothing.
        let mut blank_work = Work::waiting();
        blank_work.prompt = Some("p".to_string());
        let blank_task = store.create_task("demo", "audit", "Blank".to_string(), "generic".to_string(), blank_work, Qa::disabled()).unwrap();
        store
            .update_task(
                "demo",
                blank_task.uuid,
                TaskPatch {
                    work: Some(WorkPatch { status: Some(taskwright_store::TaskStatus::Done), ..Default::default() }),
                    ..Default::default()
                },
            )
            .unwrap();
        let results_dir = store.results_dir("demo");
        taskwright_store::result::write_result_file(
            &results_dir,
            blank_task.uuid,
            &ResultFile { task: blank_task, prompt: "p".to_string(), response: String::new(), qa: None, supervisor_override: false, history: Vec::new() },
        )
        .unwrap();

        let files = vec![(
            (ContentSource::Reference, "templates/worker.md".to_string()),
            "- {{task_title}}: {{response}}".to_string(),
        )];
        let content_store = Arc::new(FakeContentStore { files });
        let project_store = Arc::new(FakeProjectStore { reports: Mutex::new(StdHashMap::new()) });

        let reporter = Reporter::new(store, project_store.clone(), content_store);
        let result = reporter
            .build(&ReportRequest { project: "demo".to_string(), session: fixture_session(), filter: ReportFilter::default() })
            .unwrap();

        assert_eq!(result.reports.len(), 1);
        assert_eq!(result.reports[0].filename, "20260728-0900-nightly-Report.md");
        assert!(result.reports[0].markdown.contains("looks fine"));
        assert!(result.reports[0].markdown.contains("## Audit"));
        assert_eq!(result.reports[0].markdown.matches("---").count(), 1);
        assert!(project_store.reports.lock().unwrap().contains_key("20260728-0900-nightly-Report.md"));
    }

    #[test]
    fn manifest_template_fans_out_into_one_report_per_suffix() {
        let dir = TempDir::new().unwrap();
        let projects_root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(projects_root.join("demo")).unwrap();
        let store = Arc::new(TaskStore::new(projects_root));

        store
            .create_taskset("demo", "audit", "Audit".to_string(), String::new(), Templates {
                worker_report_template: Some("templates/manifest.json".to_string()),
                ..Default::default()
            }, false, Limits::default(), &FakeContentStore { files: Vec::new() })
            .unwrap();
        done_task(&store, "demo", "audit", "check it", "all clear");

        let files = vec![
            (
                (ContentSource::Reference, "templates/manifest.json".to_string()),
                r#"[{"suffix":"Report","file":"templates/full.md"},{"suffix":"Summary","file":"templates/brief.md"}]"#.to_string(),
            ),
            ((ContentSource::Reference, "templates/full.md".to_string()), "FULL: {{response}}".to_string()),
            ((ContentSource::Reference, "templates/brief.md".to_string()), "BRIEF: {{task_title}}".to_string()),
        ];
        let content_store = Arc::new(FakeContentStore { files });
        let project_store = Arc::new(FakeProjectStore { reports: Mutex::new(StdHashMap::new()) });

        let reporter = Reporter::new(store, project_store.clone(), content_store);
        let result = reporter
            .build(&ReportRequest { project: "demo".to_string(), session: fixture_session(), filter: ReportFilter::default() })
            .unwrap();

        let names: Vec<_> = result.reports.iter().map(|r| r.filename.clone()).collect();
        assert!(names.contains(&"20260728-0900-nightly-Report.md".to_string()));
        assert!(names.contains(&"20260728-0900-nightly-Summary.md".to_string()));
        assert_eq!(names.len(), 2);
    }
}

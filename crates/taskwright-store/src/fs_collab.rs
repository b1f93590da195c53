//! Filesystem-backed default implementations of the engine's
//! `ContentStore`, `ProjectStore` collaborator traits.
//!
//! These sit at the boundary with the three systems the engine explicitly
//! does not own: the project's own `files/` directory, the playbook CRUD
//! service's storage root, and the read-only reference catalog. The
//! engine only ever calls through the trait; this module is where those
//! boundaries are actually resolved to paths on disk.

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use taskwright_utils::atomic_write::write_text_atomic;
use taskwright_utils::collab::{ContentSource, ContentStore, ProjectStore};
use taskwright_utils::paths::ensure_dir_all;

pub struct FsContentStore {
    pub projects_root: Utf8PathBuf,
    pub playbooks_root: Utf8PathBuf,
    pub reference_root: Utf8PathBuf,
}

impl ContentStore for FsContentStore {
    fn load_text(&self, source: ContentSource, project: &str, path: &str) -> Result<String> {
        let full_path = match source {
            ContentSource::Project => self.projects_root.join(project).join("files").join(path),
            ContentSource::Playbook => self.playbooks_root.join(path),
            ContentSource::Reference => self.reference_root.join(path),
        };

        fs::read_to_string(&full_path)
            .with_context(|| format!("failed to load content from {full_path}"))
    }
}

pub struct FsProjectStore {
    pub projects_root: Utf8PathBuf,
}

impl FsProjectStore {
    fn project_json_path(&self, project: &str) -> Utf8PathBuf {
        self.project_root_path(project).join("project.json")
    }

    fn project_root_path(&self, project: &str) -> Utf8PathBuf {
        self.projects_root.join(project)
    }

    fn read_project_json_field(&self, project: &str, field: &str) -> Result<Option<String>> {
        let path = self.project_json_path(project);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        Ok(value
            .get(field)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}

impl ProjectStore for FsProjectStore {
    fn project_root(&self, project: &str) -> Result<Utf8PathBuf> {
        let root = self.project_root_path(project);
        if !root.is_dir() {
            bail!("project not found: {project}");
        }
        Ok(root)
    }

    fn project_exists(&self, project: &str) -> bool {
        self.project_root_path(project).is_dir()
    }

    fn disclaimer_template(&self, project: &str) -> Result<Option<String>> {
        self.read_project_json_field(project, "disclaimer_template")
    }

    fn project_context(&self, project: &str) -> Result<Option<String>> {
        self.read_project_json_field(project, "context")
    }

    fn append_log_line(&self, project: &str, line: &str) -> Result<()> {
        use std::io::Write;
        let root = self.project_root_path(project);
        ensure_dir_all(&root)?;
        let log_path = root.join("project.log");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path.as_std_path())?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn write_report(&self, project: &str, filename: &str, markdown: &str) -> Result<()> {
        let reports_dir = self.project_root_path(project).join("reports");
        ensure_dir_all(&reports_dir)?;
        write_text_atomic(&reports_dir.join(filename), markdown)?;
        Ok(())
    }
}

pub fn tasks_dir(projects_root: &Utf8Path, project: &str) -> Utf8PathBuf {
    projects_root.join(project).join("tasks")
}

pub fn results_dir(projects_root: &Utf8Path, project: &str) -> Utf8PathBuf {
    projects_root.join(project).join("results")
}

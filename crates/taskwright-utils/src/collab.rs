//! Trait boundaries for the engine's external collaborators.
//!
//! The engine itself never touches the reference catalog, the playbook/
//! project-file CRUD services, or a transport layer directly — it only
//! calls through these traits. `taskwright-store` provides the
//! filesystem-backed default implementations; tests substitute in-memory
//! ones.

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where an instructions-file reference resolves its content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Project,
    Playbook,
    Reference,
}

/// Reads instruction/schema/template text by source tag. The reference
/// catalog, playbook store, and project `files/` directory are all
/// external services from the engine's point of view; this trait is the
/// only way it reaches any of them.
pub trait ContentStore: Send + Sync {
    fn load_text(&self, source: ContentSource, project: &str, path: &str) -> Result<String>;
}

/// Persists reports and the plain-text project audit log. Project
/// lifecycle (create/destroy) is out of scope; the engine only ever
/// appends.
pub trait ProjectStore: Send + Sync {
    fn project_root(&self, project: &str) -> Result<Utf8PathBuf>;
    fn project_exists(&self, project: &str) -> bool;
    fn disclaimer_template(&self, project: &str) -> Result<Option<String>>;
    fn project_context(&self, project: &str) -> Result<Option<String>>;
    fn append_log_line(&self, project: &str, line: &str) -> Result<()>;
    fn write_report(&self, project: &str, filename: &str, markdown: &str) -> Result<()>;
}

/// Time and sleep, abstracted so the engine's round loop and recovery
/// backoff can be driven deterministically under test.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// The default `Clock`: wall time plus `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

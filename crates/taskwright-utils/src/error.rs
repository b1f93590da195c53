//! Shared error kinds used across taskwright crates.
//!
//! Each crate also defines its own narrow `thiserror` enum for its own
//! failure modes; this module holds only the handful of categories that
//! cross crate boundaries (e.g. a `NotFound` that a CLI layer needs to
//! report the same way regardless of which crate raised it).

use thiserror::Error;

/// Broad error category, used to pick a CLI exit code and a log level
/// without needing to downcast into every crate's specific error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Validation,
    Infrastructure,
    BudgetExceeded,
    RecoveryAbort,
    Corrupt,
    Internal,
}

/// A project- or path-addressed "not found" error, shared by the store and
/// the engine so the CLI layer can report both identically.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("project not found: {project}")]
    Project { project: String },

    #[error("taskset not found: {project}/{path}")]
    TaskSet { project: String, path: String },

    #[error("task not found: {uuid}")]
    Task { uuid: String },
}

/// A name/path that failed the engine's naming grammar.
#[derive(Debug, Error)]
#[error("invalid {what}: {value:?} ({reason})")]
pub struct ValidationError {
    pub what: &'static str,
    pub value: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(what: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

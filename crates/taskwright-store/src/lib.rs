//! Persistence for tasksets and tasks: JSON files on disk, one per
//! taskset, locked per-file for safe concurrent access, plus the
//! filesystem-backed collaborator implementations the engine consumes.

pub mod domain;
pub mod error;
pub mod fs_collab;
pub mod naming;
pub mod patch;
pub mod result;
pub mod store;

pub use domain::{InstructionsSource, Limits, Qa, Task, TaskSet, TaskStatus, Templates, Verdict, Work};
pub use error::StoreError;
pub use fs_collab::{FsContentStore, FsProjectStore};
pub use patch::{QaPatch, TaskPatch, TaskSetPatch, WorkPatch};
pub use result::{ErrorFile, HistoryEntry, HistoryRole, QaBlock, ResultFile};
pub use store::{ResetMode, TaskStore};

//! Shared primitives for the taskwright workspace: atomic file writes,
//! error categories, exit codes, filesystem helpers and logging init.

pub mod atomic_write;
pub mod collab;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;

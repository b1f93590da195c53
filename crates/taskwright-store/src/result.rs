//! Per-task audit artifacts: `results/<uuid>.json` (always written) and
//! `results/<uuid>-error.json` (written only on schema-validation
//! failure).

use crate::domain::Task;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskwright_utils::atomic_write::write_text_atomic;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    Worker,
    Qa,
    System,
    Supervisor,
}

/// One append-only entry in a task's history. `History` is write-only once
/// emitted — nothing in the store ever edits a past entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: DateTime<Utc>,
    pub role: HistoryRole,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub invocation: u32,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub response_size: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaBlock {
    pub prompt: String,
    pub response: String,
    pub verdict: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub task: Task,
    pub prompt: String,
    pub response: String,
    #[serde(default)]
    pub qa: Option<QaBlock>,
    #[serde(default)]
    pub supervisor_override: bool,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFile {
    pub task: Task,
    pub raw_response: String,
    pub stderr: String,
    pub expected_schema: serde_json::Value,
    pub parsed_errors: Vec<String>,
    pub raw_errors: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

fn result_path(results_dir: &Utf8Path, uuid: Uuid) -> Utf8PathBuf {
    results_dir.join(format!("{uuid}.json"))
}

fn error_path(results_dir: &Utf8Path, uuid: Uuid) -> Utf8PathBuf {
    results_dir.join(format!("{uuid}-error.json"))
}

/// Secrets are redacted a second time here, independent of whatever
/// redaction the LLM dispatcher already applied to stderr — this is the
/// last point before a response ever touches disk.
fn redact_result(mut result: ResultFile) -> anyhow::Result<ResultFile> {
    result.response = taskwright_redaction::redact(&result.response)?;
    if let Some(qa) = result.qa.as_mut() {
        qa.response = taskwright_redaction::redact(&qa.response)?;
    }
    for entry in &mut result.history {
        entry.stdout = taskwright_redaction::redact_optional(entry.stdout.as_deref())?;
        entry.stderr = taskwright_redaction::redact_optional(entry.stderr.as_deref())?;
    }
    Ok(result)
}

fn redact_error(mut error: ErrorFile) -> anyhow::Result<ErrorFile> {
    error.raw_response = taskwright_redaction::redact(&error.raw_response)?;
    error.stderr = taskwright_redaction::redact(&error.stderr)?;
    for entry in &mut error.history {
        entry.stdout = taskwright_redaction::redact_optional(entry.stdout.as_deref())?;
        entry.stderr = taskwright_redaction::redact_optional(entry.stderr.as_deref())?;
    }
    Ok(error)
}

pub fn write_result_file(results_dir: &Utf8Path, uuid: Uuid, result: &ResultFile) -> anyhow::Result<()> {
    let path = result_path(results_dir, uuid);
    let redacted = redact_result(result.clone())?;
    let body = serde_json::to_string_pretty(&redacted)?;
    write_text_atomic(&path, &body)?;
    Ok(())
}

pub fn write_error_file(results_dir: &Utf8Path, uuid: Uuid, error: &ErrorFile) -> anyhow::Result<()> {
    let path = error_path(results_dir, uuid);
    let redacted = redact_error(error.clone())?;
    let body = serde_json::to_string_pretty(&redacted)?;
    write_text_atomic(&path, &body)?;
    Ok(())
}

pub fn read_result_file(results_dir: &Utf8Path, uuid: Uuid) -> anyhow::Result<ResultFile> {
    let path = result_path(results_dir, uuid);
    let body = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&body)?)
}

pub fn read_error_file(results_dir: &Utf8Path, uuid: Uuid) -> anyhow::Result<ErrorFile> {
    let path = error_path(results_dir, uuid);
    let body = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&body)?)
}

/// Best-effort read of a prior attempt's validator errors, for seeding the
/// "previous attempt failed" block in a retry prompt. Returns an empty
/// vector if no error file exists or it can't be parsed.
pub fn read_error_artifact_messages(results_dir: &Utf8Path, uuid: Uuid) -> Vec<String> {
    read_error_file(results_dir, uuid)
        .map(|e| e.parsed_errors)
        .unwrap_or_default()
}

pub fn delete_result_artifacts(results_dir: &Utf8Path, uuid: Uuid) {
    let _ = std::fs::remove_file(result_path(results_dir, uuid));
    let _ = std::fs::remove_file(error_path(results_dir, uuid));
}

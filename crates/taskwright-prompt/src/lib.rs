//! Composes the text blob sent to an LLM invocation out of project
//! context, loaded instructions, an optional response schema, and (for QA
//! and revision) the prior attempt's output.

use serde_json::Value;
use taskwright_utils::collab::{ContentSource, ContentStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("playbook instructions file {0:?} must be \"playbook-name/rest-of-path\"")]
    MalformedPlaybookPath(String),

    #[error("failed to load instructions: {0}")]
    ContentStore(#[from] anyhow::Error),
}

/// Project-level context always rendered first, identical across phases.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub name: String,
    pub context: Option<String>,
}

/// A reference to instruction content: at least one of `file`, `text`, or
/// `prompt` is expected to carry content (enforced by the store at task
/// creation time, not here).
#[derive(Debug, Clone, Default)]
pub struct InstructionsRef {
    pub source: Option<ContentSource>,
    pub file: Option<String>,
    pub text: Option<String>,
    pub prompt: Option<String>,
}

const HEADER_TEMPLATE: &str = "=== PROJECT CONTEXT ===\n\nProject: {name}\nIMPORTANT: Use this project name for ALL file operations";

fn render_header(ctx: &ProjectContext) -> String {
    let mut out = HEADER_TEMPLATE.replace("{name}", &ctx.name);
    out.push_str("\n");
    if let Some(extra) = &ctx.context {
        if !extra.is_empty() {
            out.push('\n');
            out.push_str(extra);
            out.push('\n');
        }
    }
    out
}

/// `<project>` literals inside loaded instructions content are textually
/// substituted with the real project name, including the quoted form.
fn substitute_project_name(content: &str, project: &str) -> String {
    content
        .replace("\"<project>\"", &format!("\"{project}\""))
        .replace("<project>", project)
}

fn validate_playbook_path(path: &str) -> Result<(), PromptError> {
    let mut parts = path.splitn(2, '/');
    let name = parts.next().unwrap_or("");
    let rest = parts.next();
    if name.is_empty() || rest.is_none_or(str::is_empty) {
        return Err(PromptError::MalformedPlaybookPath(path.to_string()));
    }
    Ok(())
}

fn load_instructions_file(
    store: &dyn ContentStore,
    project: &str,
    instructions: &InstructionsRef,
) -> Result<Option<String>, PromptError> {
    let Some(file) = &instructions.file else {
        return Ok(None);
    };
    let source = instructions.source.unwrap_or(ContentSource::Project);
    if source == ContentSource::Playbook {
        validate_playbook_path(file)?;
    }
    let raw = store.load_text(source, project, file)?;
    Ok(Some(substitute_project_name(&raw, project)))
}

fn append_instructions_block(out: &mut String, instructions: &InstructionsRef, loaded_file: Option<&str>) {
    if let Some(content) = loaded_file {
        out.push_str(content);
        out.push('\n');
    }
    if let Some(text) = &instructions.text {
        if !text.is_empty() {
            out.push_str(text);
            out.push('\n');
        }
    }
    if let Some(prompt) = &instructions.prompt {
        if !prompt.is_empty() {
            out.push_str("=== TASK PROMPT ===\n\n");
            out.push_str(prompt);
            out.push('\n');
        }
    }
}

fn append_schema_block(out: &mut String, schema: &Value, is_qa: bool) {
    out.push_str("=== REQUIRED RESPONSE FORMAT ===\n\n");
    out.push_str("The response MUST be valid JSON matching this schema exactly:\n\n");
    out.push_str(&serde_json::to_string_pretty(schema).unwrap_or_default());
    out.push('\n');
    if is_qa {
        out.push_str(
            "\nThe \"verdict\" field must be exactly one of: \"pass\", \"fail\", \"escalate\".\n",
        );
    }
}

fn append_previous_failure_block(out: &mut String, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    out.push_str("=== PREVIOUS ATTEMPT FAILED - PLEASE FIX ===\n\n");
    for error in errors {
        out.push_str("- ");
        out.push_str(error);
        out.push('\n');
    }
}

/// Assemble a worker-phase prompt.
pub fn assemble_worker(
    store: &dyn ContentStore,
    project_ctx: &ProjectContext,
    project: &str,
    instructions: &InstructionsRef,
    response_schema: Option<&Value>,
    previous_validation_errors: &[String],
) -> Result<String, PromptError> {
    let mut out = render_header(project_ctx);
    let loaded = load_instructions_file(store, project, instructions)?;
    append_instructions_block(&mut out, instructions, loaded.as_deref());

    if let Some(schema) = response_schema {
        append_schema_block(&mut out, schema, false);
    }
    append_previous_failure_block(&mut out, previous_validation_errors);

    Ok(out)
}

/// Assemble a QA-phase prompt: the worker's header and instruction
/// conventions, a verdict-aware schema block, an optional common-mistakes
/// checklist, then the full worker response under review.
pub fn assemble_qa(
    store: &dyn ContentStore,
    project_ctx: &ProjectContext,
    project: &str,
    instructions: &InstructionsRef,
    response_schema: &Value,
    common_mistakes: Option<&str>,
    worker_response: &str,
) -> Result<String, PromptError> {
    let mut out = render_header(project_ctx);
    let loaded = load_instructions_file(store, project, instructions)?;
    append_instructions_block(&mut out, instructions, loaded.as_deref());

    append_schema_block(&mut out, response_schema, true);

    if let Some(checklist) = common_mistakes {
        if !checklist.is_empty() {
            out.push_str("=== COMMON MISTAKES TO CHECK ===\n\n");
            out.push_str(checklist);
            out.push('\n');
        }
    }

    out.push_str("=== WORK RESULT TO REVIEW ===\n\n");
    out.push_str(worker_response);
    out.push('\n');

    Ok(out)
}

/// Assemble a revision prompt: identical to the worker prompt, with the
/// full QA response text appended at the end.
pub fn assemble_revision(
    store: &dyn ContentStore,
    project_ctx: &ProjectContext,
    project: &str,
    instructions: &InstructionsRef,
    response_schema: Option<&Value>,
    previous_validation_errors: &[String],
    qa_feedback: &str,
) -> Result<String, PromptError> {
    let mut out = assemble_worker(
        store,
        project_ctx,
        project,
        instructions,
        response_schema,
        previous_validation_errors,
    )?;
    out.push_str("=== QA FEEDBACK ===\n\n");
    out.push_str(qa_feedback);
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    struct StubStore;

    impl ContentStore for StubStore {
        fn load_text(&self, _source: ContentSource, _project: &str, path: &str) -> Result<String> {
            Ok(format!("loaded contents of {path} for project \"<project>\""))
        }
    }

    fn ctx() -> ProjectContext {
        ProjectContext {
            name: "demo".to_string(),
            context: Some("extra context line".to_string()),
        }
    }

    #[test]
    fn header_is_always_first_and_identical_across_phases() {
        let worker = assemble_worker(
            &StubStore,
            &ctx(),
            "demo",
            &InstructionsRef::default(),
            None,
            &[],
        )
        .unwrap();
        assert!(worker.starts_with("=== PROJECT CONTEXT ===\n\nProject: demo\n"));
    }

    #[test]
    fn substitutes_project_placeholder_in_loaded_instructions() {
        let instructions = InstructionsRef {
            file: Some("do-the-thing.md".to_string()),
            ..Default::default()
        };
        let out = assemble_worker(&StubStore, &ctx(), "demo", &instructions, None, &[]).unwrap();
        assert!(out.contains("for project \"demo\""));
        assert!(!out.contains("<project>"));
    }

    #[test]
    fn rejects_malformed_playbook_path() {
        let instructions = InstructionsRef {
            source: Some(ContentSource::Playbook),
            file: Some("no-slash-here".to_string()),
            ..Default::default()
        };
        let err = assemble_worker(&StubStore, &ctx(), "demo", &instructions, None, &[]).unwrap_err();
        assert!(matches!(err, PromptError::MalformedPlaybookPath(_)));
    }

    #[test]
    fn accepts_well_formed_playbook_path() {
        let instructions = InstructionsRef {
            source: Some(ContentSource::Playbook),
            file: Some("my-playbook/section/one.md".to_string()),
            ..Default::default()
        };
        assert!(assemble_worker(&StubStore, &ctx(), "demo", &instructions, None, &[]).is_ok());
    }

    #[test]
    fn includes_schema_block_only_when_configured() {
        let schema = json!({"type": "object"});
        let with_schema =
            assemble_worker(&StubStore, &ctx(), "demo", &InstructionsRef::default(), Some(&schema), &[])
                .unwrap();
        assert!(with_schema.contains("=== REQUIRED RESPONSE FORMAT ==="));

        let without_schema =
            assemble_worker(&StubStore, &ctx(), "demo", &InstructionsRef::default(), None, &[])
                .unwrap();
        assert!(!without_schema.contains("=== REQUIRED RESPONSE FORMAT ==="));
    }

    #[test]
    fn includes_previous_failure_block_with_validator_errors_not_raw_response() {
        let out = assemble_worker(
            &StubStore,
            &ctx(),
            "demo",
            &InstructionsRef::default(),
            None,
            &["missing required field \"verdict\"".to_string()],
        )
        .unwrap();
        assert!(out.contains("=== PREVIOUS ATTEMPT FAILED - PLEASE FIX ==="));
        assert!(out.contains("missing required field"));
    }

    #[test]
    fn qa_prompt_lists_allowed_verdicts_and_embeds_worker_response() {
        let schema = json!({
            "type": "object",
            "properties": {"verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]}},
        });
        let out = assemble_qa(
            &StubStore,
            &ctx(),
            "demo",
            &InstructionsRef::default(),
            &schema,
            Some("- did you check X?"),
            "the worker's full response text",
        )
        .unwrap();
        assert!(out.contains("\"pass\", \"fail\", \"escalate\""));
        assert!(out.contains("=== COMMON MISTAKES TO CHECK ==="));
        assert!(out.contains("=== WORK RESULT TO REVIEW ==="));
        assert!(out.contains("the worker's full response text"));
    }

    #[test]
    fn revision_prompt_appends_qa_feedback_after_worker_content() {
        let out = assemble_revision(
            &StubStore,
            &ctx(),
            "demo",
            &InstructionsRef::default(),
            None,
            &[],
            "QA said: fix the header",
        )
        .unwrap();
        assert!(out.ends_with("=== QA FEEDBACK ===\n\nQA said: fix the header\n"));
    }
}

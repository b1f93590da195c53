//! Per-task execution: the Work -> QA -> Revise state machine described at
//! the component-design level by the Runner. Free functions rather than
//! methods on `Engine` so a single taskset's worth of tasks can be driven
//! either in sequence or fanned out across a worker pool without the
//! caller needing a `&mut Engine`.

use crate::config::EngineConfig;
use crate::error::EngineError;
use serde_json::Value;
use taskwright_limits::{Budget, RateLimiter};
use taskwright_llm::{DispatchRequest, LlmDispatcher};
use taskwright_prompt::{self, InstructionsRef, ProjectContext};
use taskwright_schema::{self, SchemaError};
use taskwright_store::{
    HistoryEntry, HistoryRole, QaBlock, ResultFile, StoreError, Task, TaskPatch, TaskStatus,
    TaskStore, Verdict as StoreVerdict, WorkPatch,
};
use taskwright_utils::collab::ContentStore;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened to one task this round, for the run-level tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Failed,
    /// Left in `retry`/`waiting` for a later round.
    Retry,
    /// The run's budget was already exhausted; the task was never dispatched.
    BudgetExceeded,
}

/// Reported alongside a non-`Done` outcome so the caller can drive recovery.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub llm_id: String,
}

pub struct TaskRunContext<'a> {
    pub store: &'a TaskStore,
    pub content_store: &'a dyn ContentStore,
    pub dispatcher: &'a dyn LlmDispatcher,
    pub config: &'a EngineConfig,
    pub rate_limiter: &'a RateLimiter,
    pub budget: &'a Budget,
    pub project: &'a str,
    pub project_ctx: &'a ProjectContext,
}

fn work_instructions(task: &Task) -> InstructionsRef {
    InstructionsRef {
        source: task.work.instructions_file_source.map(Into::into),
        file: task.work.instructions_file.clone(),
        text: task.work.instructions_text.clone(),
        prompt: task.work.prompt.clone(),
    }
}

fn qa_instructions(task: &Task) -> InstructionsRef {
    InstructionsRef {
        source: task.qa.instructions_file_source.map(Into::into),
        file: task.qa.instructions_file.clone(),
        text: task.qa.instructions_text.clone(),
        prompt: task.qa.prompt.clone(),
    }
}

fn format_schema_errors(errors: &[SchemaError]) -> Vec<String> {
    errors.iter().map(|e| format!("{}: {}", e.path, e.message)).collect()
}

fn default_qa_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["verdict"],
        "properties": {
            "verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]},
        },
    })
}

fn history_entry(
    role: HistoryRole,
    entry_type: &str,
    invocation: u32,
    stdout: Option<String>,
    stderr: Option<String>,
    exit_code: Option<i32>,
    response_size: Option<usize>,
    error: Option<String>,
    prompt: Option<String>,
) -> HistoryEntry {
    HistoryEntry {
        ts: chrono::Utc::now(),
        role,
        entry_type: entry_type.to_string(),
        invocation,
        stdout,
        stderr,
        exit_code,
        response_size,
        error,
        prompt,
    }
}

/// Resolve and persist a stable `llm_model_id` for the given `requested`
/// value; returns the resolved id whether or not a write was needed.
fn resolve_and_persist_llm(
    ctx: &TaskRunContext<'_>,
    uuid: Uuid,
    requested: Option<&str>,
    is_qa: bool,
) -> Result<String, StoreError> {
    let resolved = ctx.config.resolve_llm_id(requested);
    if requested == Some(resolved.as_str()) {
        return Ok(resolved);
    }
    let patch = if is_qa {
        TaskPatch {
            qa: Some(taskwright_store::QaPatch {
                llm_model_id: Some(resolved.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else {
        TaskPatch {
            work: Some(WorkPatch {
                llm_model_id: Some(resolved.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    };
    ctx.store.update_task(ctx.project, uuid, patch)?;
    Ok(resolved)
}

/// Run one task through Work (and, if enabled, QA) to a terminal or
/// retry-pending state.
pub async fn execute_task(
    ctx: &TaskRunContext<'_>,
    path: &str,
    task: &Task,
    worker_schema: Option<&Value>,
    qa_schema: Option<&Value>,
) -> Result<(TaskOutcome, Option<DispatchFailure>), EngineError> {
    let results_dir = ctx.store.results_dir(ctx.project);

    // Crash-recovery: a prior run already produced a non-empty worker
    // response but never finished QA. Skip straight to the QA workflow.
    if task.qa.enabled {
        if let Ok(existing) = taskwright_store::result::read_result_file(&results_dir, task.uuid) {
            if !existing.response.is_empty() && !task.qa.status.is_terminal() {
                return run_qa_workflow(ctx, path, task, worker_schema, qa_schema, existing).await;
            }
        }
    }

    let limits = ctx.store.get_taskset(ctx.project, path)?.limits;

    // Checked ahead of the engine's own per-dispatch gate, so a task that
    // loses a race against a concurrent dispatch is left exactly as it was
    // found rather than being charged an invocation it never made.
    if !ctx.budget.check_and_increment() {
        return Ok((TaskOutcome::BudgetExceeded, None));
    }

    let llm_id = resolve_and_persist_llm(ctx, task.uuid, task.work.llm_model_id.as_deref(), false)?;

    let invocations = task.work.invocations + 1;
    ctx.store.update_task(
        ctx.project,
        task.uuid,
        TaskPatch {
            work: Some(WorkPatch {
                invocations: Some(invocations),
                last_attempt_at: Some(chrono::Utc::now()),
                status: Some(TaskStatus::Waiting),
                ..Default::default()
            }),
            ..Default::default()
        },
    )?;

    let previous_errors = taskwright_store::result::read_error_artifact_messages(&results_dir, task.uuid);

    let prompt = taskwright_prompt::assemble_worker(
        ctx.content_store,
        ctx.project_ctx,
        ctx.project,
        &work_instructions(task),
        worker_schema,
        &previous_errors,
    )?;

    ctx.rate_limiter.wait().await;

    let dispatch = ctx
        .dispatcher
        .dispatch(DispatchRequest {
            llm_id: llm_id.clone(),
            prompt: prompt.clone(),
            timeout: ctx.config.dispatch_timeout(),
        })
        .await;

    let failure_signal = |llm_id: &str| -> Option<DispatchFailure> {
        ctx.config
            .llm_config(llm_id)
            .and_then(|c| c.recovery.as_ref())
            .map(|_| DispatchFailure { llm_id: llm_id.to_string() })
    };

    let dispatch = match dispatch {
        Err(err) => {
            let infra_retries = task.work.infra_retries + 1;
            let status = if infra_retries < limits.max_retries {
                TaskStatus::Retry
            } else {
                TaskStatus::Failed
            };
            warn!(project = ctx.project, %path, task_id = task.id, %err, "worker dispatch failed to launch");
            ctx.store.update_task(
                ctx.project,
                task.uuid,
                TaskPatch {
                    work: Some(WorkPatch {
                        status: Some(status),
                        infra_retries: Some(infra_retries),
                        error: Some(err.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )?;
            let outcome = if status == TaskStatus::Retry { TaskOutcome::Retry } else { TaskOutcome::Failed };
            return Ok((outcome, failure_signal(&llm_id)));
        }
        Ok(result) => result,
    };

    if dispatch.exit_code != 0 {
        let retryable = invocations < limits.max_worker;
        let status = if retryable { TaskStatus::Retry } else { TaskStatus::Failed };
        warn!(
            project = ctx.project, %path, task_id = task.id, exit_code = dispatch.exit_code,
            "worker exited non-zero"
        );
        ctx.store.update_task(
            ctx.project,
            task.uuid,
            TaskPatch {
                work: Some(WorkPatch {
                    status: Some(status),
                    error: Some(format!("worker exited with code {}", dispatch.exit_code)),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )?;
        let outcome = if retryable { TaskOutcome::Retry } else { TaskOutcome::Failed };
        return Ok((outcome, failure_signal(&llm_id)));
    }

    let extracted = taskwright_schema::extract_json(&dispatch.stdout);

    let response = match (worker_schema, &extracted) {
        (Some(schema), Some(json_text)) => {
            let outcome = taskwright_schema::validate_json(json_text.as_bytes(), schema)
                .map_err(|e| anyhow::anyhow!("worker response is not valid JSON: {e}"))?;
            if !outcome.valid {
                return Ok(handle_validation_failure(
                    ctx,
                    path,
                    task,
                    invocations,
                    &limits,
                    &dispatch.stdout,
                    &dispatch.stderr,
                    schema,
                    &format_schema_errors(&outcome.errors),
                    Vec::new(),
                )?);
            }
            json_text.clone()
        }
        (Some(schema), None) => {
            return Ok(handle_validation_failure(
                ctx,
                path,
                task,
                invocations,
                &limits,
                &dispatch.stdout,
                &dispatch.stderr,
                schema,
                &Vec::new(),
                vec!["no JSON object or array could be extracted from the response".to_string()],
            )?);
        }
        (None, Some(json_text)) => json_text.clone(),
        (None, None) => dispatch.stdout.trim().to_string(),
    };

    let entry = history_entry(
        HistoryRole::Worker,
        "worker_response",
        invocations,
        Some(dispatch.stdout.clone()),
        Some(dispatch.stderr.clone()),
        Some(dispatch.exit_code),
        Some(dispatch.response_size),
        None,
        Some(prompt.clone()),
    );

    let result = ResultFile {
        task: task.clone(),
        prompt,
        response,
        qa: None,
        supervisor_override: false,
        history: vec![entry],
    };

    if !task.qa.enabled {
        taskwright_store::result::write_result_file(&results_dir, task.uuid, &result)
            .map_err(anyhow::Error::from)?;
        ctx.store.update_task(
            ctx.project,
            task.uuid,
            TaskPatch {
                work: Some(WorkPatch {
                    status: Some(TaskStatus::Done),
                    error: Some(String::new()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )?;
        info!(project = ctx.project, %path, task_id = task.id, "task done (no QA)");
        return Ok((TaskOutcome::Done, None));
    }

    taskwright_store::result::write_result_file(&results_dir, task.uuid, &result)
        .map_err(anyhow::Error::from)?;
    ctx.store.update_task(
        ctx.project,
        task.uuid,
        TaskPatch {
            work: Some(WorkPatch {
                status: Some(TaskStatus::Waiting),
                error: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        },
    )?;

    run_qa_workflow(ctx, path, task, worker_schema, qa_schema, result).await
}

#[allow(clippy::too_many_arguments)]
fn handle_validation_failure(
    ctx: &TaskRunContext<'_>,
    path: &str,
    task: &Task,
    invocations: u32,
    limits: &taskwright_store::Limits,
    raw_response: &str,
    stderr: &str,
    schema: &Value,
    parsed_errors: &[String],
    raw_errors: Vec<String>,
) -> Result<(TaskOutcome, Option<DispatchFailure>), EngineError> {
    let results_dir = ctx.store.results_dir(ctx.project);
    let retryable = invocations < limits.max_worker;
    let status = if retryable { TaskStatus::Retry } else { TaskStatus::Failed };

    let error_file = taskwright_store::ErrorFile {
        task: task.clone(),
        raw_response: raw_response.to_string(),
        stderr: stderr.to_string(),
        expected_schema: schema.clone(),
        parsed_errors: parsed_errors.to_vec(),
        raw_errors,
        history: vec![history_entry(
            HistoryRole::System,
            "schema_validation_failed",
            invocations,
            None,
            None,
            None,
            None,
            Some(format!("{} validator error(s)", parsed_errors.len())),
            None,
        )],
    };
    taskwright_store::result::write_error_file(&results_dir, task.uuid, &error_file)
        .map_err(anyhow::Error::from)?;

    ctx.store.update_task(
        ctx.project,
        task.uuid,
        TaskPatch {
            work: Some(WorkPatch {
                status: Some(status),
                error: Some(format!(
                    "schema validation failed, see results/{}-error.json",
                    task.uuid
                )),
                ..Default::default()
            }),
            ..Default::default()
        },
    )?;

    let outcome = if retryable { TaskOutcome::Retry } else { TaskOutcome::Failed };
    Ok((outcome, None))
}

fn map_verdict(verdict: taskwright_schema::Verdict) -> StoreVerdict {
    match verdict {
        taskwright_schema::Verdict::Pass => StoreVerdict::Pass,
        taskwright_schema::Verdict::Fail => StoreVerdict::Fail,
        taskwright_schema::Verdict::Escalate => StoreVerdict::Escalate,
    }
}

async fn run_qa_workflow(
    ctx: &TaskRunContext<'_>,
    path: &str,
    task: &Task,
    worker_schema: Option<&Value>,
    qa_schema: Option<&Value>,
    mut result: ResultFile,
) -> Result<(TaskOutcome, Option<DispatchFailure>), EngineError> {
    let results_dir = ctx.store.results_dir(ctx.project);
    let limits = ctx.store.get_taskset(ctx.project, path)?.limits;
    let owned_default_schema = default_qa_schema();
    let schema = qa_schema.unwrap_or(&owned_default_schema);

    let llm_id = resolve_and_persist_llm(ctx, task.uuid, task.qa.llm_model_id.as_deref(), true)?;

    loop {
        let current = ctx.store.get_task_by_id(ctx.project, path, task.id)?;
        if current.qa.invocations >= limits.max_qa {
            ctx.store.update_task(
                ctx.project,
                task.uuid,
                TaskPatch {
                    work: Some(WorkPatch { status: Some(TaskStatus::Failed), ..Default::default() }),
                    qa: Some(taskwright_store::QaPatch {
                        status: Some(TaskStatus::Failed),
                        error: Some("QA invocation limit reached without a conclusive verdict".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )?;
            return Ok((TaskOutcome::Failed, None));
        }

        if !ctx.budget.check_and_increment() {
            return Ok((TaskOutcome::BudgetExceeded, None));
        }

        let qa_invocations = current.qa.invocations + 1;
        ctx.rate_limiter.wait().await;

        let qa_prompt = taskwright_prompt::assemble_qa(
            ctx.content_store,
            ctx.project_ctx,
            ctx.project,
            &qa_instructions(task),
            schema,
            None,
            &result.response,
        )?;

        ctx.store.update_task(
            ctx.project,
            task.uuid,
            TaskPatch {
                qa: Some(taskwright_store::QaPatch {
                    invocations: Some(qa_invocations),
                    status: Some(TaskStatus::Waiting),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )?;

        let dispatch = ctx
            .dispatcher
            .dispatch(DispatchRequest {
                llm_id: llm_id.clone(),
                prompt: qa_prompt.clone(),
                timeout: ctx.config.dispatch_timeout(),
            })
            .await;

        let failure_signal = ctx
            .config
            .llm_config(&llm_id)
            .and_then(|c| c.recovery.as_ref())
            .map(|_| DispatchFailure { llm_id: llm_id.clone() });

        let dispatch = match dispatch {
            Err(err) => {
                warn!(project = ctx.project, %path, task_id = task.id, %err, "QA dispatch failed to launch");
                let retryable = qa_invocations < limits.max_qa;
                let status = if retryable { TaskStatus::Retry } else { TaskStatus::Failed };
                ctx.store.update_task(
                    ctx.project,
                    task.uuid,
                    TaskPatch {
                        qa: Some(taskwright_store::QaPatch {
                            status: Some(status),
                            error: Some(err.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                )?;
                if !retryable {
                    ctx.store.update_task(
                        ctx.project,
                        task.uuid,
                        TaskPatch {
                            work: Some(WorkPatch { status: Some(TaskStatus::Failed), ..Default::default() }),
                            ..Default::default()
                        },
                    )?;
                    return Ok((TaskOutcome::Failed, failure_signal));
                }
                return Ok((TaskOutcome::Retry, failure_signal));
            }
            Ok(result) => result,
        };

        if dispatch.exit_code != 0 {
            let retryable = qa_invocations < limits.max_qa;
            let status = if retryable { TaskStatus::Retry } else { TaskStatus::Failed };
            ctx.store.update_task(
                ctx.project,
                task.uuid,
                TaskPatch {
                    qa: Some(taskwright_store::QaPatch {
                        status: Some(status),
                        error: Some(format!("QA exited with code {}", dispatch.exit_code)),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )?;
            if !retryable {
                ctx.store.update_task(
                    ctx.project,
                    task.uuid,
                    TaskPatch {
                        work: Some(WorkPatch { status: Some(TaskStatus::Failed), ..Default::default() }),
                        ..Default::default()
                    },
                )?;
                return Ok((TaskOutcome::Failed, failure_signal));
            }
            return Ok((TaskOutcome::Retry, failure_signal));
        }

        let verdict = taskwright_schema::extract_json(&dispatch.stdout)
            .and_then(|text| taskwright_schema::parse_qa_response(text.as_bytes()).ok());

        let Some(verdict) = verdict else {
            let retryable = qa_invocations < limits.max_qa;
            let status = if retryable { TaskStatus::Retry } else { TaskStatus::Failed };
            let error_file = taskwright_store::ErrorFile {
                task: task.clone(),
                raw_response: dispatch.stdout.clone(),
                stderr: dispatch.stderr.clone(),
                expected_schema: schema.clone(),
                parsed_errors: vec!["response did not contain a recognised verdict".to_string()],
                raw_errors: Vec::new(),
                history: Vec::new(),
            };
            taskwright_store::result::write_error_file(&results_dir, task.uuid, &error_file)
                .map_err(anyhow::Error::from)?;
            ctx.store.update_task(
                ctx.project,
                task.uuid,
                TaskPatch {
                    qa: Some(taskwright_store::QaPatch { status: Some(status), ..Default::default() }),
                    ..Default::default()
                },
            )?;
            if !retryable {
                ctx.store.update_task(
                    ctx.project,
                    task.uuid,
                    TaskPatch {
                        work: Some(WorkPatch { status: Some(TaskStatus::Failed), ..Default::default() }),
                        ..Default::default()
                    },
                )?;
                return Ok((TaskOutcome::Failed, None));
            }
            return Ok((TaskOutcome::Retry, None));
        };

        result.qa = Some(QaBlock {
            prompt: qa_prompt,
            response: dispatch.stdout.clone(),
            verdict: verdict.as_str().to_string(),
        });
        result.history.push(history_entry(
            HistoryRole::Qa,
            "qa_response",
            qa_invocations,
            Some(dispatch.stdout.clone()),
            Some(dispatch.stderr.clone()),
            Some(dispatch.exit_code),
            Some(dispatch.response_size),
            None,
            None,
        ));
        taskwright_store::result::write_result_file(&results_dir, task.uuid, &result)
            .map_err(anyhow::Error::from)?;

        match verdict {
            taskwright_schema::Verdict::Pass | taskwright_schema::Verdict::Escalate => {
                ctx.store.update_task(
                    ctx.project,
                    task.uuid,
                    TaskPatch {
                        work: Some(WorkPatch { status: Some(TaskStatus::Done), ..Default::default() }),
                        qa: Some(taskwright_store::QaPatch {
                            status: Some(TaskStatus::Done),
                            verdict: Some(map_verdict(verdict)),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                )?;
                info!(project = ctx.project, %path, task_id = task.id, verdict = verdict.as_str(), "task done");
                return Ok((TaskOutcome::Done, None));
            }
            taskwright_schema::Verdict::Fail => {
                if qa_invocations >= limits.max_qa {
                    ctx.store.update_task(
                        ctx.project,
                        task.uuid,
                        TaskPatch {
                            work: Some(WorkPatch { status: Some(TaskStatus::Failed), ..Default::default() }),
                            qa: Some(taskwright_store::QaPatch {
                                status: Some(TaskStatus::Failed),
                                verdict: Some(StoreVerdict::Fail),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    )?;
                    return Ok((TaskOutcome::Failed, None));
                }

                ctx.rate_limiter.wait().await;
                if !ctx.budget.check_and_increment() {
                    return Ok((TaskOutcome::BudgetExceeded, None));
                }

                let revision_invocations = current.work.invocations + 1;
                ctx.store.update_task(
                    ctx.project,
                    task.uuid,
                    TaskPatch {
                        work: Some(WorkPatch {
                            invocations: Some(revision_invocations),
                            last_attempt_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                )?;

                let worker_llm = resolve_and_persist_llm(ctx, task.uuid, task.work.llm_model_id.as_deref(), false)?;
                let revision_prompt = taskwright_prompt::assemble_revision(
                    ctx.content_store,
                    ctx.project_ctx,
                    ctx.project,
                    &work_instructions(task),
                    worker_schema,
                    &[],
                    &dispatch.stdout,
                )?;
                let revised = ctx
                    .dispatcher
                    .dispatch(DispatchRequest {
                        llm_id: worker_llm,
                        prompt: revision_prompt.clone(),
                        timeout: ctx.config.dispatch_timeout(),
                    })
                    .await;

                match revised {
                    Ok(revised) if revised.exit_code == 0 => {
                        let extracted = taskwright_schema::extract_json(&revised.stdout);
                        let validated_response = match (worker_schema, &extracted) {
                            (Some(schema), Some(json_text)) => {
                                let outcome = taskwright_schema::validate_json(json_text.as_bytes(), schema)
                                    .map_err(|e| anyhow::anyhow!("revised worker response is not valid JSON: {e}"))?;
                                if !outcome.valid {
                                    return Ok(handle_validation_failure(
                                        ctx,
                                        path,
                                        task,
                                        revision_invocations,
                                        &limits,
                                        &revised.stdout,
                                        &revised.stderr,
                                        schema,
                                        &format_schema_errors(&outcome.errors),
                                        Vec::new(),
                                    )?);
                                }
                                json_text.clone()
                            }
                            (Some(schema), None) => {
                                return Ok(handle_validation_failure(
                                    ctx,
                                    path,
                                    task,
                                    revision_invocations,
                                    &limits,
                                    &revised.stdout,
                                    &revised.stderr,
                                    schema,
                                    &Vec::new(),
                                    vec!["no JSON object or array could be extracted from the response".to_string()],
                                )?);
                            }
                            (None, Some(json_text)) => json_text.clone(),
                            (None, None) => revised.stdout.trim().to_string(),
                        };
                        result.response = validated_response;
                        result.prompt = revision_prompt;
                        result.history.push(history_entry(
                            HistoryRole::Worker,
                            "revision",
                            qa_invocations,
                            Some(revised.stdout.clone()),
                            Some(revised.stderr.clone()),
                            Some(revised.exit_code),
                            Some(revised.response_size),
                            None,
                            None,
                        ));
                        taskwright_store::result::write_result_file(&results_dir, task.uuid, &result)
                            .map_err(anyhow::Error::from)?;
                    }
                    Ok(revised) => {
                        warn!(project = ctx.project, %path, task_id = task.id, exit_code = revised.exit_code, "revision dispatch exited non-zero");
                    }
                    Err(err) => {
                        warn!(project = ctx.project, %path, task_id = task.id, %err, "revision dispatch failed to launch");
                    }
                }
                // Loop back around for the next QA pass.
            }
        }
    }
}

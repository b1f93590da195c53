//! The Runner's top level: admission, the round loop, sequential/parallel
//! dispatch, recovery-probe orchestration, and the read-side tool-protocol
//! methods built on top of `task_exec`.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::request::{
    CheckStatus, DoctorCheck, DoctorReport, ResetRequest, ResetResult, ResultsPage,
    ResultsRequest, RunRequest, RunResult, TaskStatusRequest, TaskStatusResult,
};
use crate::task_exec::{self, DispatchFailure, TaskOutcome, TaskRunContext};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskwright_limits::{Budget, RateLimiter, RecoveryController, TaskLimits};
use taskwright_llm::{DispatchRequest, LlmDispatcher};
use taskwright_prompt::ProjectContext;
use taskwright_store::{Task, TaskPatch, TaskStatus, TaskStore, WorkPatch};
use taskwright_utils::collab::{Clock, ContentSource, ContentStore, ProjectStore};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

struct TasksetPlan {
    path: String,
    worker_schema: Option<Value>,
    qa_schema: Option<Value>,
}

struct RunningGuard {
    engine: Arc<Engine>,
    project: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.engine
            .running_projects
            .lock()
            .expect("running-set mutex poisoned")
            .remove(&self.project);
    }
}

fn is_playbook_path(path: &str) -> bool {
    let mut parts = path.splitn(2, '/');
    let name = parts.next().unwrap_or("");
    let rest = parts.next();
    !name.is_empty() && rest.is_some_and(|r| !r.is_empty())
}

pub struct Engine {
    store: Arc<TaskStore>,
    project_store: Arc<dyn ProjectStore>,
    content_store: Arc<dyn ContentStore>,
    dispatcher: Arc<dyn LlmDispatcher>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    rate_limiter: Arc<RateLimiter>,
    recovery: Mutex<HashMap<String, Arc<RecoveryController>>>,
    running_projects: Mutex<HashSet<String>>,
}

impl Engine {
    pub fn new(
        store: Arc<TaskStore>,
        project_store: Arc<dyn ProjectStore>,
        content_store: Arc<dyn ContentStore>,
        dispatcher: Arc<dyn LlmDispatcher>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.runner.rate_limit.max_requests,
            Duration::from_secs(config.runner.rate_limit.period_seconds),
        ));
        Self {
            store,
            project_store,
            content_store,
            dispatcher,
            clock,
            config: Arc::new(config),
            rate_limiter,
            recovery: Mutex::new(HashMap::new()),
            running_projects: Mutex::new(HashSet::new()),
        }
    }

    fn recovery_for(&self, llm_id: &str) -> Arc<RecoveryController> {
        let mut map = self.recovery.lock().expect("recovery map mutex poisoned");
        map.entry(llm_id.to_string())
            .or_insert_with(|| {
                let cfg = self
                    .config
                    .llm_config(llm_id)
                    .and_then(|c| c.recovery.clone())
                    .unwrap_or_default();
                Arc::new(RecoveryController::new(cfg))
            })
            .clone()
    }

    /// `request.timeout` overrides the configured dispatch timeout for the
    /// duration of one run; everything else comes from the standing config.
    fn effective_config(&self, requested_timeout: Duration) -> Arc<EngineConfig> {
        if requested_timeout.as_secs() == self.config.runner.dispatch_timeout_seconds {
            return Arc::clone(&self.config);
        }
        let mut cfg = (*self.config).clone();
        cfg.runner.dispatch_timeout_seconds = requested_timeout.as_secs().max(1);
        Arc::new(cfg)
    }

    fn validate_disclaimer(&self, project: &str) -> Result<(), EngineError> {
        let disclaimer = self
            .project_store
            .disclaimer_template(project)
            .map_err(EngineError::Other)?;
        match disclaimer.as_deref() {
            None | Some("") => Err(EngineError::DisclaimerMissing { project: project.to_string() }),
            Some("none") => Ok(()),
            Some(path) => {
                if !is_playbook_path(path) {
                    return Err(EngineError::DisclaimerInvalid {
                        project: project.to_string(),
                        path: path.to_string(),
                        reason: "must be \"none\" or \"playbook-name/rest-of-path\"".to_string(),
                    });
                }
                self.content_store
                    .load_text(ContentSource::Playbook, project, path)
                    .map_err(|err| EngineError::DisclaimerInvalid {
                        project: project.to_string(),
                        path: path.to_string(),
                        reason: err.to_string(),
                    })?;
                Ok(())
            }
        }
    }

    fn load_schema_template(
        &self,
        project: &str,
        taskset: &str,
        template: Option<&str>,
    ) -> Result<Option<Value>, EngineError> {
        let Some(template) = template else { return Ok(None) };
        let text = self
            .content_store
            .load_text(ContentSource::Reference, project, template)
            .map_err(|source| EngineError::TemplateUnavailable {
                taskset: taskset.to_string(),
                path: template.to_string(),
                source,
            })?;
        let value: Value = serde_json::from_str(&text).map_err(|err| EngineError::TemplateUnavailable {
            taskset: taskset.to_string(),
            path: template.to_string(),
            source: anyhow::anyhow!(err),
        })?;
        Ok(Some(value))
    }

    fn validate_report_template(
        &self,
        project: &str,
        taskset: &str,
        template: Option<&str>,
    ) -> Result<(), EngineError> {
        let Some(template) = template else { return Ok(()) };
        self.content_store
            .load_text(ContentSource::Reference, project, template)
            .map_err(|source| EngineError::TemplateUnavailable {
                taskset: taskset.to_string(),
                path: template.to_string(),
                source,
            })?;
        Ok(())
    }

    fn eligible_tasks(
        &self,
        project: &str,
        path: &str,
        task_type: Option<&str>,
    ) -> Result<(bool, Vec<Task>), EngineError> {
        let taskset = self.store.get_taskset(project, path)?;
        let tasks = taskset
            .tasks
            .into_iter()
            .filter(|t| matches!(t.work.status, TaskStatus::Waiting | TaskStatus::Retry))
            .filter(|t| task_type.is_none_or(|ty| ty == t.task_type))
            .collect();
        Ok((taskset.parallel, tasks))
    }

    /// Admits the run (project/disclaimer checks, running-flag, template and
    /// schema validation, eligible-task enumeration, pre-flight probing),
    /// then either drives the round loop inline or detaches it in the
    /// background, per `request.wait`.
    pub async fn run(self: Arc<Self>, request: RunRequest) -> Result<RunResult, EngineError> {
        if !self.project_store.project_exists(&request.project) {
            return Err(EngineError::ProjectNotFound { project: request.project.clone() });
        }
        self.validate_disclaimer(&request.project)?;

        let guard = {
            let mut set = self.running_projects.lock().expect("running-set mutex poisoned");
            if !set.insert(request.project.clone()) {
                return Ok(RunResult {
                    project: request.project.clone(),
                    path: request.path_prefix.clone(),
                    message: "a run is already in progress for this project".to_string(),
                    ..Default::default()
                });
            }
            RunningGuard { engine: Arc::clone(&self), project: request.project.clone() }
        };

        let prefix = request.path_prefix.clone().unwrap_or_default();
        let tasksets = self.store.list_tasksets(&request.project, &prefix)?;

        let mut plans = Vec::with_capacity(tasksets.len());
        for (path, taskset) in &tasksets {
            let worker_schema = self.load_schema_template(
                &request.project,
                path,
                taskset.templates.worker_response_schema.as_deref(),
            )?;
            let qa_schema = self.load_schema_template(
                &request.project,
                path,
                taskset.templates.qa_response_schema.as_deref(),
            )?;
            self.validate_report_template(
                &request.project,
                path,
                taskset.templates.worker_report_template.as_deref(),
            )?;
            self.validate_report_template(
                &request.project,
                path,
                taskset.templates.qa_report_template.as_deref(),
            )?;
            plans.push(TasksetPlan { path: path.clone(), worker_schema, qa_schema });
        }

        let mut tasks_found = 0usize;
        let mut task_limits = Vec::new();
        let mut unique_llms = HashSet::new();
        for plan in &plans {
            let (_, tasks) = self.eligible_tasks(&request.project, &plan.path, request.task_type.as_deref())?;
            let limits = self.store.get_taskset(&request.project, &plan.path)?.limits;
            for task in &tasks {
                tasks_found += 1;
                task_limits.push(TaskLimits {
                    max_worker_calls: limits.max_worker,
                    max_qa_calls: limits.max_qa,
                    qa_enabled: task.qa.enabled,
                });
                unique_llms.insert(self.config.resolve_llm_id(task.work.llm_model_id.as_deref()));
                if task.qa.enabled {
                    unique_llms.insert(self.config.resolve_llm_id(task.qa.llm_model_id.as_deref()));
                }
            }
        }

        if tasks_found == 0 {
            return Ok(RunResult {
                project: request.project.clone(),
                path: request.path_prefix.clone(),
                message: "no eligible tasks".to_string(),
                ..Default::default()
            });
        }

        let config = self.effective_config(request.timeout);

        for llm_id in &unique_llms {
            let test_prompt = config
                .llm_config(llm_id)
                .map(|c| c.test_prompt.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "test".to_string());
            let probe = self
                .dispatcher
                .dispatch(DispatchRequest {
                    llm_id: llm_id.clone(),
                    prompt: test_prompt,
                    timeout: config.dispatch_timeout(),
                })
                .await;
            if !matches!(probe, Ok(r) if r.exit_code == 0) {
                return Ok(RunResult {
                    project: request.project.clone(),
                    path: request.path_prefix.clone(),
                    tasks_found,
                    message: format!("pre-flight probe failed for LLM {llm_id:?}"),
                    ..Default::default()
                });
            }
        }

        let budget = Arc::new(Budget::with_buffer_default(&task_limits));
        let project_ctx = ProjectContext {
            name: request.project.clone(),
            context: self.project_store.project_context(&request.project).map_err(EngineError::Other)?,
        };

        if !request.wait {
            let engine = Arc::clone(&self);
            let project = request.project.clone();
            let path_prefix = request.path_prefix.clone();
            let task_type = request.task_type.clone();
            let parallel = request.parallel;
            tokio::spawn(async move {
                let _guard = guard;
                let outcome = engine
                    .clone()
                    .run_rounds(
                        Arc::clone(&engine),
                        &project,
                        path_prefix.as_deref(),
                        task_type.as_deref(),
                        parallel,
                        plans,
                        tasks_found,
                        budget,
                        project_ctx,
                        config,
                    )
                    .await;
                match outcome {
                    Ok(result) => info!(
                        project = %result.project,
                        tasks_succeeded = result.tasks_succeeded,
                        tasks_failed = result.tasks_failed,
                        "background run finished"
                    ),
                    Err(err) => warn!(%err, "background run failed"),
                }
            });
            return Ok(RunResult {
                project: request.project.clone(),
                path: request.path_prefix.clone(),
                tasks_found,
                message: "run started in background".to_string(),
                ..Default::default()
            });
        }

        self.clone()
            .run_rounds(
                Arc::clone(&self),
                &request.project,
                request.path_prefix.as_deref(),
                request.task_type.as_deref(),
                request.parallel,
                plans,
                tasks_found,
                budget,
                project_ctx,
                config,
            )
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_rounds(
        &self,
        engine_arc: Arc<Engine>,
        project: &str,
        path_prefix: Option<&str>,
        task_type: Option<&str>,
        parallel_override: Option<bool>,
        plans: Vec<TasksetPlan>,
        tasks_found: usize,
        budget: Arc<Budget>,
        project_ctx: ProjectContext,
        config: Arc<EngineConfig>,
    ) -> Result<RunResult, EngineError> {
        let mut succeeded = 0u32;
        let mut failed = 0u32;
        let mut touched: HashSet<Uuid> = HashSet::new();
        let mut aborted = false;
        let mut budget_exceeded = false;

        'rounds: for round in 1..=config.runner.max_rounds {
            if round > 1 {
                self.clock.sleep(Duration::from_secs(config.runner.round_delay_seconds)).await;
            }

            let mut round_groups = Vec::new();
            let mut round_llms = HashSet::new();
            for plan in &plans {
                let (parallel_flag, tasks) = self.eligible_tasks(project, &plan.path, task_type)?;
                if tasks.is_empty() {
                    continue;
                }
                for task in &tasks {
                    round_llms.insert(config.resolve_llm_id(task.work.llm_model_id.as_deref()));
                    if task.qa.enabled {
                        round_llms.insert(config.resolve_llm_id(task.qa.llm_model_id.as_deref()));
                    }
                }
                round_groups.push((plan, parallel_flag, tasks));
            }

            if round_groups.is_empty() {
                break 'rounds;
            }

            // Parallel mode dispatches the whole round at once, so the gate
            // has to cover every LLM the round will touch up front.
            if self.check_recovery_for_llms(round_llms.iter(), &config).await {
                aborted = true;
                break 'rounds;
            }

            if budget_exceeded {
                break 'rounds;
            }

            for (plan, parallel_flag, tasks) in round_groups {
                if budget_exceeded {
                    break;
                }
                let parallel = parallel_override.unwrap_or(parallel_flag);

                if parallel {
                    let semaphore = Arc::new(Semaphore::new(config.runner.max_concurrent.max(1)));
                    let mut joins = JoinSet::new();
                    let mut ids: HashMap<tokio::task::Id, Uuid> = HashMap::new();
                    for task in tasks {
                        if budget.is_exceeded() {
                            budget_exceeded = true;
                            break;
                        }
                        let uuid = task.uuid;
                        let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore closed");
                        let task_engine = Arc::clone(&engine_arc);
                        let task_budget = Arc::clone(&budget);
                        let task_config = Arc::clone(&config);
                        let task_ctx = project_ctx.clone();
                        let task_project = project.to_string();
                        let task_path = plan.path.clone();
                        let worker_schema = plan.worker_schema.clone();
                        let qa_schema = plan.qa_schema.clone();
                        let abort_handle = joins.spawn(async move {
                            let _permit = permit;
                            run_one_task(
                                &task_engine,
                                &task_config,
                                &task_budget,
                                &task_ctx,
                                &task_project,
                                &task_path,
                                &task,
                                worker_schema.as_ref(),
                                qa_schema.as_ref(),
                            )
                            .await
                        });
                        ids.insert(abort_handle.id(), uuid);
                    }
                    while let Some(joined) = joins.join_next_with_id().await {
                        let (id, outcome) = match joined {
                            Ok((id, outcome)) => (id, Ok(outcome)),
                            Err(join_err) => (join_err.id(), Err(join_err)),
                        };
                        let uuid = ids.remove(&id).expect("every spawned task id was recorded");
                        self.collect_outcome(project, &plan.path, uuid, outcome, &mut touched, &mut succeeded, &mut failed);
                    }
                } else {
                    for task in tasks {
                        if budget.is_exceeded() {
                            budget_exceeded = true;
                            break;
                        }
                        let mut task_llms = vec![config.resolve_llm_id(task.work.llm_model_id.as_deref())];
                        if task.qa.enabled {
                            task_llms.push(config.resolve_llm_id(task.qa.llm_model_id.as_deref()));
                        }
                        if self.check_recovery_for_llms(task_llms.iter(), &config).await {
                            aborted = true;
                            break 'rounds;
                        }

                        let uuid = task.uuid;
                        let task_engine = Arc::clone(&engine_arc);
                        let task_budget = Arc::clone(&budget);
                        let task_config = Arc::clone(&config);
                        let task_ctx = project_ctx.clone();
                        let task_project = project.to_string();
                        let task_path = plan.path.clone();
                        let worker_schema = plan.worker_schema.clone();
                        let qa_schema = plan.qa_schema.clone();
                        let handle = tokio::spawn(async move {
                            run_one_task(
                                &task_engine,
                                &task_config,
                                &task_budget,
                                &task_ctx,
                                &task_project,
                                &task_path,
                                &task,
                                worker_schema.as_ref(),
                                qa_schema.as_ref(),
                            )
                            .await
                        });
                        let result = handle.await;
                        let done = matches!(&result, Ok(Ok((TaskOutcome::Done, _))));
                        self.collect_outcome(project, &plan.path, uuid, result, &mut touched, &mut succeeded, &mut failed);
                        if !done {
                            break;
                        }
                    }
                }
            }
        }

        let tasks_executed = touched.len();
        let tasks_skipped = tasks_found.saturating_sub(tasks_executed);

        Ok(RunResult {
            project: project.to_string(),
            path: path_prefix.map(str::to_string),
            tasks_found,
            tasks_executed,
            tasks_succeeded: succeeded as usize,
            tasks_failed: failed as usize,
            tasks_skipped,
            aborted,
            message: if aborted {
                "run aborted: recovery timeout exceeded".to_string()
            } else if budget_exceeded {
                format!("BUDGET EXCEEDED: stopped dispatching, {tasks_skipped} task(s) left waiting")
            } else if failed > 0 {
                format!("{failed} task(s) failed")
            } else {
                "all eligible tasks finished".to_string()
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_outcome(
        &self,
        project: &str,
        taskset_path: &str,
        uuid: Uuid,
        result: Result<Result<(TaskOutcome, Option<DispatchFailure>), EngineError>, tokio::task::JoinError>,
        touched: &mut HashSet<Uuid>,
        succeeded: &mut u32,
        failed: &mut u32,
    ) {
        match result {
            Ok(Ok((outcome, failure))) => {
                match outcome {
                    TaskOutcome::Done => {
                        touched.insert(uuid);
                        *succeeded += 1;
                    }
                    TaskOutcome::Failed => {
                        touched.insert(uuid);
                        *failed += 1;
                    }
                    // A race lost to the budget gate: the task was dispatched
                    // just as the run-wide budget flipped exceeded. Leave it
                    // untouched so it's tallied as skipped, not failed.
                    TaskOutcome::BudgetExceeded => {}
                    TaskOutcome::Retry => {
                        touched.insert(uuid);
                    }
                }
                if let Some(failure) = failure {
                    self.recovery_for(&failure.llm_id).enter_recovery(&failure.llm_id, self.clock.now());
                }
            }
            Ok(Err(err)) => {
                touched.insert(uuid);
                warn!(project, taskset = taskset_path, %err, "task execution returned an engine error");
                *failed += 1;
            }
            Err(join_err) => {
                touched.insert(uuid);
                warn!(project, taskset = taskset_path, %join_err, "task execution panicked");
                *failed += 1;
                let _ = self.store.update_task(
                    project,
                    uuid,
                    TaskPatch {
                        work: Some(WorkPatch {
                            status: Some(TaskStatus::Failed),
                            error: Some(format!("PANIC in task execution: {join_err}")),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                );
            }
        }
    }

    /// Checks every given LLM id for an active recovery backoff, waiting out
    /// (and probing) any that are in recovery. Returns `true` if any of them
    /// timed out and the run should abort.
    async fn check_recovery_for_llms<'a>(
        &self,
        llm_ids: impl IntoIterator<Item = &'a String>,
        config: &EngineConfig,
    ) -> bool {
        for llm_id in llm_ids {
            let controller = self.recovery_for(llm_id);
            if controller.is_in_recovery() && self.handle_recovery(&controller, llm_id, config).await {
                return true;
            }
        }
        false
    }

    async fn handle_recovery(&self, controller: &RecoveryController, llm_id: &str, config: &EngineConfig) -> bool {
        loop {
            let now = self.clock.now();
            if controller.should_abort(now) {
                warn!(llm_id, "recovery timeout exceeded, aborting run");
                return true;
            }
            let wait = controller.wait_duration();
            self.clock.sleep(wait).await;

            let test_prompt = config
                .llm_config(llm_id)
                .map(|c| c.test_prompt.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "test".to_string());

            let probe = self
                .dispatcher
                .dispatch(DispatchRequest {
                    llm_id: llm_id.to_string(),
                    prompt: test_prompt,
                    timeout: config.dispatch_timeout(),
                })
                .await;

            match probe {
                Ok(result) if result.exit_code == 0 => {
                    controller.exit_recovery();
                    info!(llm_id, "recovery probe succeeded, resuming dispatch");
                    return false;
                }
                _ => controller.advance_schedule(),
            }
        }
    }

    /// Dispatches a cheap probe to every enabled LLM and reports pass/fail,
    /// mirroring the teacher's environment health-check command.
    pub async fn doctor(&self) -> DoctorReport {
        let mut checks = Vec::new();

        if self.config.enabled_llms.is_empty() {
            checks.push(DoctorCheck {
                name: "enabled-llms".to_string(),
                status: CheckStatus::Fail,
                details: "no LLMs are enabled in configuration".to_string(),
            });
        }

        for llm_id in &self.config.enabled_llms {
            let test_prompt = self
                .config
                .llm_config(llm_id)
                .map(|c| c.test_prompt.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "test".to_string());
            let probe = self
                .dispatcher
                .dispatch(DispatchRequest {
                    llm_id: llm_id.clone(),
                    prompt: test_prompt,
                    timeout: self.config.dispatch_timeout(),
                })
                .await;
            checks.push(match probe {
                Ok(result) if result.exit_code == 0 => DoctorCheck {
                    name: format!("llm:{llm_id}"),
                    status: CheckStatus::Ok,
                    details: "probe dispatch succeeded".to_string(),
                },
                Ok(result) => DoctorCheck {
                    name: format!("llm:{llm_id}"),
                    status: CheckStatus::Fail,
                    details: format!("probe exited with code {}", result.exit_code),
                },
                Err(err) => DoctorCheck {
                    name: format!("llm:{llm_id}"),
                    status: CheckStatus::Fail,
                    details: err.to_string(),
                },
            });
        }

        let ok = checks.iter().all(|c| c.status != CheckStatus::Fail);
        DoctorReport { checks, ok }
    }

    pub fn task_status(&self, request: TaskStatusRequest) -> Result<TaskStatusResult, EngineError> {
        if !self.project_store.project_exists(&request.project) {
            return Err(EngineError::ProjectNotFound { project: request.project.clone() });
        }
        let prefix = request.path_prefix.as_deref().unwrap_or("");
        let tasksets = self.store.list_tasksets(&request.project, prefix)?;

        let mut result = TaskStatusResult::default();
        for (_, taskset) in &tasksets {
            for task in &taskset.tasks {
                if let Some(ty) = request.task_type.as_deref() {
                    if ty != task.task_type {
                        continue;
                    }
                }
                match task.work.status {
                    TaskStatus::Waiting => result.waiting += 1,
                    TaskStatus::Processing => result.processing += 1,
                    TaskStatus::Done => result.done += 1,
                    TaskStatus::Failed => result.failed += 1,
                    TaskStatus::Retry => result.retry += 1,
                    TaskStatus::Superseded => result.superseded += 1,
                }
            }
        }
        result.run_in_progress = self
            .running_projects
            .lock()
            .expect("running-set mutex poisoned")
            .contains(&request.project);
        Ok(result)
    }

    pub fn results(&self, request: ResultsRequest) -> Result<ResultsPage, EngineError> {
        if !self.project_store.project_exists(&request.project) {
            return Err(EngineError::ProjectNotFound { project: request.project.clone() });
        }
        let prefix = request.path_prefix.as_deref().unwrap_or("");
        let tasksets = self.store.list_tasksets(&request.project, prefix)?;
        let results_dir = self.store.results_dir(&request.project);

        let worker_re = request
            .worker_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| EngineError::Other(anyhow::anyhow!(err)))?;
        let qa_re = request
            .qa_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| EngineError::Other(anyhow::anyhow!(err)))?;

        let mut matched = Vec::new();
        for (_, taskset) in &tasksets {
            for task in &taskset.tasks {
                if let Some(id) = request.task_id {
                    if task.id != id {
                        continue;
                    }
                }
                if let Some(status) = request.status {
                    if task.work.status != status {
                        continue;
                    }
                }
                let Ok(mut result) = taskwright_store::result::read_result_file(&results_dir, task.uuid) else {
                    continue;
                };

                let passes = match (&worker_re, &qa_re) {
                    (None, None) => true,
                    (Some(w), None) => w.is_match(&result.response),
                    (None, Some(q)) => result.qa.as_ref().is_some_and(|qa| q.is_match(&qa.response)),
                    (Some(w), Some(q)) => {
                        w.is_match(&result.response) || result.qa.as_ref().is_some_and(|qa| q.is_match(&qa.response))
                    }
                };
                if !passes {
                    continue;
                }

                if request.summary {
                    result.response = summarize(&result.response);
                    if let Some(qa) = result.qa.as_mut() {
                        qa.response = summarize(&qa.response);
                    }
                    result.history.clear();
                }

                matched.push(result);
            }
        }

        matched.sort_by_key(|r| r.task.id);
        let total = matched.len();
        let limit = if request.limit == 0 { usize::MAX } else { request.limit };
        let items = matched.into_iter().skip(request.offset).take(limit).collect();
        Ok(ResultsPage { total, items })
    }

    pub fn reset_taskset(&self, request: ResetRequest) -> Result<ResetResult, EngineError> {
        if !self.project_store.project_exists(&request.project) {
            return Err(EngineError::ProjectNotFound { project: request.project.clone() });
        }
        let (_, count) =
            self.store
                .reset_taskset(&request.project, &request.path, request.mode, request.delete_results)?;
        Ok(ResetResult { tasks_reset: count })
    }
}

fn summarize(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_CHARS).collect();
    format!("{truncated}…")
}

#[allow(clippy::too_many_arguments)]
async fn run_one_task(
    engine: &Arc<Engine>,
    config: &EngineConfig,
    budget: &Arc<Budget>,
    project_ctx: &ProjectContext,
    project: &str,
    path: &str,
    task: &Task,
    worker_schema: Option<&Value>,
    qa_schema: Option<&Value>,
) -> Result<(TaskOutcome, Option<DispatchFailure>), EngineError> {
    let ctx = TaskRunContext {
        store: engine.store.as_ref(),
        content_store: engine.content_store.as_ref(),
        dispatcher: engine.dispatcher.as_ref(),
        config,
        rate_limiter: engine.rate_limiter.as_ref(),
        budget: budget.as_ref(),
        project,
        project_ctx,
    };
    task_exec::execute_task(&ctx, path, task, worker_schema, qa_schema).await
}

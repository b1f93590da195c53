//! The task runner: admits a run request, drives the round loop in
//! sequential or parallel mode, enforces budget/rate-limit/recovery
//! policy, and exposes the read-side status/results/reset operations on
//! top of the same store the CLI and any other façade share.

pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod task_exec;

pub use config::{EngineConfig, LlmConfig, RateLimitConfig, RunnerConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use request::{
    CheckStatus, DoctorCheck, DoctorReport, ResetRequest, ResetResult, ResultsPage,
    ResultsRequest, RunRequest, RunResult, TaskStatusRequest, TaskStatusResult,
};
pub use task_exec::{DispatchFailure, TaskOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use std::sync::Arc;
    use taskwright_limits::RecoveryConfig;
    use taskwright_llm::{ScriptedResponse, StubLlmDispatcher};
    use taskwright_store::{FsContentStore, FsProjectStore, Limits, Qa, TaskStore, Templates, Work};
    use taskwright_utils::collab::SystemClock;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<TaskStore>,
        project_store: Arc<FsProjectStore>,
        content_store: Arc<FsContentStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let projects_root = root.join("projects");
        std::fs::create_dir_all(projects_root.join("demo").join("files")).unwrap();
        std::fs::write(
            projects_root.join("demo").join("project.json"),
            json!({"disclaimer_template": "none"}).to_string(),
        )
        .unwrap();

        Fixture {
            store: Arc::new(TaskStore::new(projects_root.clone())),
            project_store: Arc::new(FsProjectStore { projects_root: projects_root.clone() }),
            content_store: Arc::new(FsContentStore {
                projects_root: projects_root.clone(),
                playbooks_root: root.join("playbooks"),
                reference_root: root.join("reference"),
            }),
            _dir: dir,
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            runner: RunnerConfig {
                max_concurrent: 4,
                max_rounds: 3,
                round_delay_seconds: 0,
                rate_limit: RateLimitConfig { max_requests: 1000, period_seconds: 1 },
                buffer_pct: 0.10,
                dispatch_timeout_seconds: 5,
            },
            default_llm: "stub".to_string(),
            enabled_llms: vec!["stub".to_string()],
            llms: Default::default(),
        }
    }

    fn build_engine(fixture: &Fixture, dispatcher: StubLlmDispatcher) -> Arc<Engine> {
        Arc::new(Engine::new(
            Arc::clone(&fixture.store),
            Arc::clone(&fixture.project_store) as Arc<dyn taskwright_utils::collab::ProjectStore>,
            Arc::clone(&fixture.content_store) as Arc<dyn taskwright_utils::collab::ContentStore>,
            Arc::new(dispatcher),
            Arc::new(SystemClock),
            test_config(),
        ))
    }

    fn create_single_task(fixture: &Fixture, qa_enabled: bool) {
        fixture
            .store
            .create_taskset(
                "demo",
                "work",
                "Demo taskset".to_string(),
                String::new(),
                Templates::default(),
                false,
                Limits::default(),
                fixture.content_store.as_ref(),
            )
            .unwrap();

        let mut work = Work::waiting();
        work.prompt = Some("do the thing".to_string());

        let qa = if qa_enabled {
            let mut qa = Qa::enabled_waiting();
            qa.prompt = Some("check the thing".to_string());
            qa
        } else {
            Qa::disabled()
        };

        fixture
            .store
            .create_task("demo", "work", "Task one".to_string(), "generic".to_string(), work, qa)
            .unwrap();
    }

    #[tokio::test]
    async fn simple_run_without_qa_reaches_done() {
        let fixture = fixture();
        create_single_task(&fixture, false);

        let dispatcher = StubLlmDispatcher::always_pass(json!({"result": "ok"}).to_string());
        let engine = build_engine(&fixture, dispatcher);

        let result = Arc::clone(&engine).run(RunRequest::new("demo")).await.unwrap();
        assert_eq!(result.tasks_found, 1);
        assert_eq!(result.tasks_succeeded, 1);
        assert_eq!(result.tasks_failed, 0);

        let status = engine
            .task_status(TaskStatusRequest { project: "demo".to_string(), path_prefix: None, task_type: None })
            .unwrap();
        assert_eq!(status.done, 1);
    }

    #[tokio::test]
    async fn qa_pass_verdict_finishes_task_as_done() {
        let fixture = fixture();
        create_single_task(&fixture, true);

        let dispatcher = StubLlmDispatcher::new(vec![
            ScriptedResponse::Ok { stdout: String::new(), exit_code: 0 }, // pre-flight probe
            ScriptedResponse::Ok { stdout: json!({"result": "ok"}).to_string(), exit_code: 0 },
            ScriptedResponse::Ok { stdout: json!({"verdict": "pass"}).to_string(), exit_code: 0 },
        ]);
        let engine = build_engine(&fixture, dispatcher);

        let result = Arc::clone(&engine).run(RunRequest::new("demo")).await.unwrap();
        assert_eq!(result.tasks_succeeded, 1);

        let page = engine
            .results(ResultsRequest {
                project: "demo".to_string(),
                path_prefix: None,
                task_id: None,
                status: None,
                offset: 0,
                limit: 10,
                summary: false,
                worker_pattern: None,
                qa_pattern: None,
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0].qa.is_some());
    }

    #[tokio::test]
    async fn parallel_mode_dispatches_every_eligible_task() {
        let fixture = fixture();
        fixture
            .store
            .create_taskset(
                "demo",
                "work",
                "Demo taskset".to_string(),
                String::new(),
                Templates::default(),
                true,
                Limits::default(),
                fixture.content_store.as_ref(),
            )
            .unwrap();
        for i in 0..5 {
            let mut work = Work::waiting();
            work.prompt = Some(format!("task {i}"));
            fixture
                .store
                .create_task("demo", "work", format!("Task {i}"), "generic".to_string(), work, Qa::disabled())
                .unwrap();
        }

        let dispatcher = StubLlmDispatcher::always_pass(json!({"result": "ok"}).to_string());
        let engine = build_engine(&fixture, dispatcher);

        let result = engine.run(RunRequest::new("demo")).await.unwrap();
        assert_eq!(result.tasks_found, 5);
        assert_eq!(result.tasks_succeeded, 5);
    }

    #[tokio::test]
    async fn preflight_probe_failure_aborts_before_any_dispatch() {
        let fixture = fixture();
        create_single_task(&fixture, false);

        let dispatcher = StubLlmDispatcher::new(vec![ScriptedResponse::Ok {
            stdout: String::new(),
            exit_code: 1,
        }]);
        let engine = build_engine(&fixture, dispatcher);

        let result = engine.run(RunRequest::new("demo")).await.unwrap();
        assert_eq!(result.tasks_succeeded, 0);
        assert_eq!(result.tasks_executed, 0);
        assert!(result.message.contains("pre-flight"));
    }

    #[tokio::test]
    async fn fire_and_forget_run_returns_immediately_and_finishes_in_background() {
        let fixture = fixture();
        create_single_task(&fixture, false);

        let dispatcher = StubLlmDispatcher::always_pass(json!({"result": "ok"}).to_string());
        let engine = build_engine(&fixture, dispatcher);

        let mut request = RunRequest::new("demo");
        request.wait = false;
        let result = engine.clone().run(request).await.unwrap();
        assert_eq!(result.message, "run started in background");

        for _ in 0..50 {
            let status = engine
                .task_status(TaskStatusRequest { project: "demo".to_string(), path_prefix: None, task_type: None })
                .unwrap();
            if status.done == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("background run never reached done");
    }

    #[tokio::test]
    async fn recovery_trigger_then_successful_probe_resumes_dispatch() {
        let fixture = fixture();
        create_single_task(&fixture, false);

        let mut llms = std::collections::HashMap::new();
        llms.insert(
            "stub".to_string(),
            LlmConfig {
                recovery: Some(RecoveryConfig {
                    test_schedule: vec![std::time::Duration::from_millis(10)],
                    abort_after: std::time::Duration::from_secs(60),
                }),
                test_prompt: "test".to_string(),
                rate_limit_patterns: Vec::new(),
            },
        );
        let mut config = test_config();
        config.llms = llms;

        let dispatcher = StubLlmDispatcher::new(vec![
            ScriptedResponse::Ok { stdout: String::new(), exit_code: 0 },
            ScriptedResponse::Infra("infra failure".to_string()),
            ScriptedResponse::Ok { stdout: String::new(), exit_code: 0 },
            ScriptedResponse::Ok { stdout: json!({"result": "ok"}).to_string(), exit_code: 0 },
        ]);

        let engine = Arc::new(Engine::new(
            Arc::clone(&fixture.store),
            Arc::clone(&fixture.project_store) as Arc<dyn taskwright_utils::collab::ProjectStore>,
            Arc::clone(&fixture.content_store) as Arc<dyn taskwright_utils::collab::ContentStore>,
            Arc::new(dispatcher),
            Arc::new(SystemClock),
            config,
        ));

        let result = engine.run(RunRequest::new("demo")).await.unwrap();
        assert_eq!(result.tasks_succeeded, 1);
    }

    #[tokio::test]
    async fn reset_taskset_clears_failed_tasks() {
        let fixture = fixture();
        create_single_task(&fixture, false);
        let dispatcher = StubLlmDispatcher::new(vec![ScriptedResponse::Infra("boom".to_string())]);
        let engine = build_engine(&fixture, dispatcher);

        // First probe fails infra-side, which aborts before dispatch; force a
        // task into `failed` directly through the store to exercise reset.
        let (task, path) = fixture.store.get_task("demo", {
            let taskset = fixture.store.get_taskset("demo", "work").unwrap();
            taskset.tasks[0].uuid
        }).unwrap();
        fixture
            .store
            .update_task(
                "demo",
                task.uuid,
                taskwright_store::TaskPatch {
                    work: Some(taskwright_store::WorkPatch {
                        status: Some(taskwright_store::TaskStatus::Failed),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        let reset = engine
            .reset_taskset(ResetRequest {
                project: "demo".to_string(),
                path,
                mode: taskwright_store::ResetMode::Failed,
                delete_results: false,
            })
            .unwrap();
        assert_eq!(reset.tasks_reset, 1);
    }
}

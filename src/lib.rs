//! Wiring for the `taskwright` binary: turns parsed CLI arguments into
//! `taskwright-engine`/`taskwright-report` calls against the filesystem
//! collaborator implementations from `taskwright-store`. All actual
//! orchestration logic lives in the library crates this binary depends
//! on; this crate owns only argument parsing, configuration resolution,
//! and output formatting.

pub mod cli;
pub mod config;
pub mod exit_codes;

use clap::Parser as _;
use cli::{Cli, Commands, ConfigCommands};
use config::CliOverrides;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskwright_engine::{Engine, ResetRequest, RunRequest, TaskStatusRequest};
use taskwright_llm::SubprocessDispatcher;
use taskwright_report::{ReportFilter, ReportRequest, ReportSession, Reporter};
use taskwright_store::{FsContentStore, FsProjectStore, TaskStore};
use taskwright_utils::collab::SystemClock;
use taskwright_utils::exit_codes::ExitCode;

/// Parses `args` (normally `std::env::args()`), runs the requested
/// subcommand, and returns the process exit code. Never panics: every
/// failure is mapped to an error message on stderr and a non-zero code.
pub async fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            // clap has already written its own message to stdout/stderr.
            return err.exit_code();
        }
    };

    init_logging(cli.verbose);

    match dispatch(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::error_exit_code(&err).as_i32()
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();
}

async fn dispatch(cli: &Cli) -> anyhow::Result<i32> {
    let overrides = CliOverrides {
        projects_root: cli.projects_root.clone(),
        default_llm: cli.default_llm.clone(),
        max_concurrent: run_max_concurrent(cli),
        max_rounds: run_max_rounds(cli),
    };
    let resolved = config::load(cli.config.as_deref(), &overrides)?;

    let store = Arc::new(TaskStore::new(resolved.projects_root.clone()));
    let project_store = Arc::new(FsProjectStore { projects_root: resolved.projects_root.clone() });
    let content_store = Arc::new(FsContentStore {
        projects_root: resolved.projects_root.clone(),
        playbooks_root: resolved.playbooks_root.clone(),
        reference_root: resolved.reference_root.clone(),
    });
    let dispatcher = Arc::new(SubprocessDispatcher::new(resolved.llm_binaries.clone()));
    let clock = Arc::new(SystemClock);

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::clone(&project_store) as Arc<dyn taskwright_utils::collab::ProjectStore>,
        Arc::clone(&content_store) as Arc<dyn taskwright_utils::collab::ContentStore>,
        dispatcher,
        clock,
        resolved.engine.clone(),
    ));

    match &cli.command {
        Commands::Run {
            project,
            path_prefix,
            task_type,
            parallel,
            sequential,
            timeout_seconds,
            no_wait,
            ..
        } => {
            let request = RunRequest {
                project: project.clone(),
                path_prefix: path_prefix.clone(),
                task_type: task_type.clone(),
                parallel: if *parallel { Some(true) } else if *sequential { Some(false) } else { None },
                timeout: Duration::from_secs(*timeout_seconds),
                wait: !*no_wait,
            };
            let result = engine.run(request).await?;
            let code = exit_codes::run_exit_code(&result).as_i32();
            print_output(cli.json, &result_to_json(&result), &format_run_result(&result));
            Ok(code)
        }

        Commands::Status { project, path_prefix, task_type } => {
            let result = engine.task_status(TaskStatusRequest {
                project: project.clone(),
                path_prefix: path_prefix.clone(),
                task_type: task_type.clone(),
            })?;
            print_output(
                cli.json,
                &json!({
                    "waiting": result.waiting,
                    "processing": result.processing,
                    "done": result.done,
                    "failed": result.failed,
                    "retry": result.retry,
                    "superseded": result.superseded,
                    "run_in_progress": result.run_in_progress,
                }),
                &format!(
                    "waiting={} processing={} done={} failed={} retry={} superseded={} run_in_progress={}",
                    result.waiting,
                    result.processing,
                    result.done,
                    result.failed,
                    result.retry,
                    result.superseded,
                    result.run_in_progress
                ),
            );
            Ok(ExitCode::SUCCESS.as_i32())
        }

        Commands::Reset { project, path, mode, delete_results } => {
            let result = engine.reset_taskset(ResetRequest {
                project: project.clone(),
                path: path.clone(),
                mode: (*mode).into(),
                delete_results: *delete_results,
            })?;
            print_output(
                cli.json,
                &json!({"tasks_reset": result.tasks_reset}),
                &format!("tasks_reset={}", result.tasks_reset),
            );
            Ok(ExitCode::SUCCESS.as_i32())
        }

        Commands::Doctor => {
            let report = engine.doctor().await;
            let checks: Vec<_> = report
                .checks
                .iter()
                .map(|c| json!({"name": c.name, "status": format!("{:?}", c.status), "details": c.details}))
                .collect();
            let plain = report
                .checks
                .iter()
                .map(|c| format!("[{:?}] {}: {}", c.status, c.name, c.details))
                .collect::<Vec<_>>()
                .join("\n");
            print_output(cli.json, &json!({"ok": report.ok, "checks": checks}), &plain);
            Ok(if report.ok { ExitCode::SUCCESS.as_i32() } else { ExitCode::FAILED.as_i32() })
        }

        Commands::Report { project, title, intro, disclaimer_template, path_prefix, task_type } => {
            let reporter = Reporter::new(store, project_store, content_store);
            let session = ReportSession {
                title: title.clone(),
                intro: intro.clone(),
                issued: chrono::Utc::now(),
                disclaimer_template: disclaimer_template.clone(),
            };
            let filter = ReportFilter { path_prefix: path_prefix.clone(), task_type: task_type.clone(), ..Default::default() };
            let result = reporter.build(&ReportRequest { project: project.clone(), session, filter })?;
            let names: Vec<_> = result.reports.iter().map(|r| r.filename.clone()).collect();
            print_output(cli.json, &json!({"reports": names}), &names.join("\n"));
            Ok(ExitCode::SUCCESS.as_i32())
        }

        Commands::Config { command: ConfigCommands::Show } => {
            let mut attribution: Vec<_> = resolved.source_attribution.iter().collect();
            attribution.sort_by(|a, b| a.0.cmp(b.0));
            let plain = attribution.iter().map(|(k, v)| format!("{k} = {v}")).collect::<Vec<_>>().join("\n");
            let json_attribution: serde_json::Map<_, _> =
                attribution.iter().map(|(k, v)| ((*k).clone(), json!(v.to_string()))).collect();
            print_output(cli.json, &json!({"source_attribution": json_attribution}), &plain);
            Ok(ExitCode::SUCCESS.as_i32())
        }
    }
}

fn run_max_concurrent(cli: &Cli) -> Option<usize> {
    match &cli.command {
        Commands::Run { max_concurrent, .. } => Some(*max_concurrent),
        _ => None,
    }
}

fn run_max_rounds(cli: &Cli) -> Option<u32> {
    match &cli.command {
        Commands::Run { max_rounds, .. } => Some(*max_rounds),
        _ => None,
    }
}

fn result_to_json(result: &taskwright_engine::RunResult) -> serde_json::Value {
    json!({
        "project": result.project,
        "path": result.path,
        "tasks_found": result.tasks_found,
        "tasks_executed": result.tasks_executed,
        "tasks_succeeded": result.tasks_succeeded,
        "tasks_failed": result.tasks_failed,
        "tasks_skipped": result.tasks_skipped,
        "aborted": result.aborted,
        "message": result.message,
    })
}

fn format_run_result(result: &taskwright_engine::RunResult) -> String {
    format!(
        "found={} executed={} succeeded={} failed={} skipped={} aborted={} — {}",
        result.tasks_found, result.tasks_executed, result.tasks_succeeded, result.tasks_failed, result.tasks_skipped, result.aborted, result.message
    )
}

fn print_output(as_json: bool, json_value: &serde_json::Value, plain: &str) {
    if as_json {
        println!("{json_value}");
    } else {
        println!("{plain}");
    }
}

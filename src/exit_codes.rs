//! Maps a finished `run` or a CLI-level error to the process exit code,
//! reusing the named constants from `taskwright_utils::exit_codes`.

use taskwright_engine::{EngineError, RunResult};
use taskwright_report::ReportError;
use taskwright_utils::exit_codes::ExitCode;

/// Maps a finished `run` to its process exit code. A pre-flight failure
/// (`tasks_executed == 0` with no tasks aborted) is not itself a failure
/// exit — it is surfaced through `result.message` instead.
#[must_use]
pub fn run_exit_code(result: &RunResult) -> ExitCode {
    if result.aborted {
        ExitCode::ABORTED
    } else if result.tasks_failed > 0 {
        ExitCode::FAILED
    } else {
        ExitCode::SUCCESS
    }
}

/// Exit code for any command that returned an error before producing a
/// `RunResult`. Distinguishes a caller mistake (unknown project, missing
/// disclaimer template, ...) from an unexpected internal failure, the way
/// the teacher's `error_to_exit_code_and_kind` distinguishes error kinds
/// before falling back to a generic code.
#[must_use]
pub fn error_exit_code(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<crate::config::ConfigError>().is_some() {
        return ExitCode::CLI_ARGS;
    }
    if matches!(err.downcast_ref::<EngineError>(), Some(EngineError::ProjectNotFound { .. })) {
        return ExitCode::CLI_ARGS;
    }
    if matches!(err.downcast_ref::<ReportError>(), Some(ReportError::ProjectNotFound(_))) {
        return ExitCode::CLI_ARGS;
    }
    ExitCode::INTERNAL
}

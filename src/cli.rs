//! Command-line interface: a thin wrapper that turns arguments into
//! `taskwright-engine`/`taskwright-report` request DTOs. Not the
//! tool-protocol RPC facade other collaborators would normally speak to —
//! this exists so the workspace is runnable and testable end-to-end.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

/// taskwright - catalogs tasks, dispatches them to an LLM, QAs the
/// response, and persists every artifact.
#[derive(Parser)]
#[command(name = "taskwright")]
#[command(about = "LLM task orchestration engine")]
#[command(version)]
pub struct Cli {
    /// Path to an explicit config file (skips upward discovery).
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Overrides the projects root directory.
    #[arg(long, global = true)]
    pub projects_root: Option<Utf8PathBuf>,

    /// Overrides the default LLM id.
    #[arg(long, global = true)]
    pub default_llm: Option<String>,

    /// Emit results as JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run eligible tasks in a project (or a path prefix within one).
    Run {
        project: String,

        /// Only run tasksets under this path prefix.
        #[arg(long)]
        path_prefix: Option<String>,

        #[arg(long)]
        task_type: Option<String>,

        /// Force sequential or parallel dispatch, overriding each
        /// taskset's own `parallel` flag.
        #[arg(long, conflicts_with = "sequential")]
        parallel: bool,

        #[arg(long, conflicts_with = "parallel")]
        sequential: bool,

        #[arg(long, default_value_t = 120)]
        timeout_seconds: u64,

        /// Return immediately and let the run finish in the background.
        #[arg(long)]
        no_wait: bool,

        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,

        #[arg(long, default_value_t = 3)]
        max_rounds: u32,
    },

    /// Report per-status task counts for a project.
    Status {
        project: String,
        #[arg(long)]
        path_prefix: Option<String>,
        #[arg(long)]
        task_type: Option<String>,
    },

    /// Reset tasks back to `waiting` in one taskset.
    Reset {
        project: String,
        path: String,
        #[arg(long, value_enum, default_value_t = ResetModeArg::Failed)]
        mode: ResetModeArg,
        #[arg(long)]
        delete_results: bool,
    },

    /// Probe every enabled LLM and report pass/fail.
    Doctor,

    /// Render markdown reports from existing result files.
    Report {
        project: String,
        /// Report title; also seeds the filename prefix.
        #[arg(long)]
        title: String,
        #[arg(long)]
        intro: Option<String>,
        /// Playbook-relative disclaimer path, `"none"`, or omitted.
        #[arg(long)]
        disclaimer_template: Option<String>,
        #[arg(long)]
        path_prefix: Option<String>,
        #[arg(long)]
        task_type: Option<String>,
    },

    /// Inspect resolved configuration and where each value came from.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration and its source attribution.
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetModeArg {
    All,
    Failed,
}

impl From<ResetModeArg> for taskwright_store::ResetMode {
    fn from(mode: ResetModeArg) -> Self {
        match mode {
            ResetModeArg::All => Self::All,
            ResetModeArg::Failed => Self::Failed,
        }
    }
}

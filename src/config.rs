//! Hierarchical configuration: CLI > config file > built-in defaults.
//!
//! The engine itself takes a plain `EngineConfig`; this module is wiring
//! that turns a discovered TOML file plus CLI overrides into one, the way
//! the teacher's `config.rs` turns `CliArgs` + a discovered
//! `.xchecker/config.toml` into its own `Config`.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use taskwright_engine::{EngineConfig, LlmConfig as EngineLlmConfig, RateLimitConfig, RunnerConfig};
use taskwright_limits::RecoveryConfig;
use taskwright_llm::LlmBinaryConfig;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = ".taskwright";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("config file {0:?} is not valid TOML")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where a resolved setting came from, for the `config show` diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    projects_root: Option<String>,
    playbooks_root: Option<String>,
    reference_root: Option<String>,
    #[serde(default)]
    defaults: FileDefaults,
    #[serde(default)]
    runner: FileRunner,
    #[serde(default)]
    llms: HashMap<String, FileLlm>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileDefaults {
    default_llm: Option<String>,
    enabled_llms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRunner {
    max_concurrent: Option<usize>,
    max_rounds: Option<u32>,
    round_delay_seconds: Option<u64>,
    buffer_pct: Option<f64>,
    dispatch_timeout_seconds: Option<u64>,
    #[serde(default)]
    rate_limit: FileRateLimit,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRateLimit {
    max_requests: Option<usize>,
    period_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileLlm {
    binary: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    test_prompt: Option<String>,
    #[serde(default)]
    rate_limit_patterns: Vec<String>,
    recovery: Option<FileRecovery>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileRecovery {
    test_schedule_seconds: Vec<u64>,
    abort_after_seconds: u64,
}

/// CLI-supplied overrides, applied on top of the config file. Every field
/// is optional; an absent one falls through to the file value, then the
/// built-in default.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub projects_root: Option<Utf8PathBuf>,
    pub default_llm: Option<String>,
    pub max_concurrent: Option<usize>,
    pub max_rounds: Option<u32>,
}

/// Everything the root binary needs to construct an `Engine` and
/// `Reporter`, plus the attribution map backing `taskwright config show`.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub projects_root: Utf8PathBuf,
    pub playbooks_root: Utf8PathBuf,
    pub reference_root: Utf8PathBuf,
    pub engine: EngineConfig,
    pub llm_binaries: HashMap<String, LlmBinaryConfig>,
    pub source_attribution: HashMap<String, ConfigSource>,
    pub config_path: Option<PathBuf>,
}

/// Discovers `.taskwright/config.toml` starting from `start_dir` and
/// walking upward, stopping at a repository root marker or the
/// filesystem root. Mirrors the teacher's upward-search discovery.
#[must_use]
pub fn discover_config_path(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if current.join(".git").exists() || current.parent().is_none() {
            return None;
        }
        current = current.parent().unwrap().to_path_buf();
    }
}

/// Resolves the full configuration from an explicit path (if any),
/// upward discovery otherwise, and the given CLI overrides.
pub fn load(explicit_path: Option<&Utf8Path>, overrides: &CliOverrides) -> Result<ResolvedConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Other(anyhow::anyhow!(source)))?;
    let config_path = explicit_path
        .map(|p| p.as_std_path().to_path_buf())
        .or_else(|| discover_config_path(&cwd));

    let mut source_attribution = HashMap::new();
    for key in [
        "projects_root",
        "playbooks_root",
        "reference_root",
        "default_llm",
        "enabled_llms",
        "runner.max_concurrent",
        "runner.max_rounds",
        "runner.round_delay_seconds",
        "runner.buffer_pct",
        "runner.dispatch_timeout_seconds",
        "runner.rate_limit.max_requests",
        "runner.rate_limit.period_seconds",
    ] {
        source_attribution.insert(key.to_string(), ConfigSource::Default);
    }

    let file = match &config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read(path.clone(), source))?;
            let parsed: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse(path.clone(), source))?;
            mark_file_attributions(&parsed, path, &mut source_attribution);
            parsed
        }
        None => FileConfig::default(),
    };

    let runner_defaults = RunnerConfig::default();
    let runner = RunnerConfig {
        max_concurrent: overrides.max_concurrent.or(file.runner.max_concurrent).unwrap_or(runner_defaults.max_concurrent),
        max_rounds: overrides.max_rounds.or(file.runner.max_rounds).unwrap_or(runner_defaults.max_rounds),
        round_delay_seconds: file.runner.round_delay_seconds.unwrap_or(runner_defaults.round_delay_seconds),
        rate_limit: RateLimitConfig {
            max_requests: file.runner.rate_limit.max_requests.unwrap_or(runner_defaults.rate_limit.max_requests),
            period_seconds: file.runner.rate_limit.period_seconds.unwrap_or(runner_defaults.rate_limit.period_seconds),
        },
        buffer_pct: file.runner.buffer_pct.unwrap_or(runner_defaults.buffer_pct),
        dispatch_timeout_seconds: file.runner.dispatch_timeout_seconds.unwrap_or(runner_defaults.dispatch_timeout_seconds),
    };

    if overrides.max_concurrent.is_some() {
        source_attribution.insert("runner.max_concurrent".to_string(), ConfigSource::Cli);
    }
    if overrides.max_rounds.is_some() {
        source_attribution.insert("runner.max_rounds".to_string(), ConfigSource::Cli);
    }

    let default_llm = overrides
        .default_llm
        .clone()
        .or(file.defaults.default_llm.clone())
        .unwrap_or_default();
    if overrides.default_llm.is_some() {
        source_attribution.insert("default_llm".to_string(), ConfigSource::Cli);
    }
    let enabled_llms = file.defaults.enabled_llms.clone().unwrap_or_else(|| {
        let mut ids: Vec<String> = file.llms.keys().cloned().collect();
        ids.sort();
        ids
    });

    let mut llms = HashMap::new();
    let mut llm_binaries = HashMap::new();
    for (id, entry) in &file.llms {
        llms.insert(
            id.clone(),
            EngineLlmConfig {
                recovery: entry.recovery.as_ref().map(|r| RecoveryConfig {
                    test_schedule: r.test_schedule_seconds.iter().map(|s| std::time::Duration::from_secs(*s)).collect(),
                    abort_after: std::time::Duration::from_secs(r.abort_after_seconds),
                }),
                test_prompt: entry.test_prompt.clone().unwrap_or_else(|| "test".to_string()),
                rate_limit_patterns: entry.rate_limit_patterns.clone(),
            },
        );
        if let Some(binary) = &entry.binary {
            llm_binaries.insert(id.clone(), LlmBinaryConfig { binary: PathBuf::from(binary), args: entry.args.clone() });
        }
    }

    let projects_root = overrides
        .projects_root
        .clone()
        .or_else(|| file.projects_root.as_deref().map(Utf8PathBuf::from))
        .unwrap_or_else(|| Utf8PathBuf::from("./projects"));
    if overrides.projects_root.is_some() {
        source_attribution.insert("projects_root".to_string(), ConfigSource::Cli);
    }
    let playbooks_root = file.playbooks_root.as_deref().map(Utf8PathBuf::from).unwrap_or_else(|| Utf8PathBuf::from("./playbooks"));
    let reference_root = file.reference_root.as_deref().map(Utf8PathBuf::from).unwrap_or_else(|| Utf8PathBuf::from("./reference"));

    Ok(ResolvedConfig {
        projects_root,
        playbooks_root,
        reference_root,
        engine: EngineConfig { runner, default_llm, enabled_llms, llms },
        llm_binaries,
        source_attribution,
        config_path,
    })
}

fn mark_file_attributions(file: &FileConfig, path: &Path, attribution: &mut HashMap<String, ConfigSource>) {
    let source = ConfigSource::ConfigFile(path.to_path_buf());
    let mut mark = |key: &str, present: bool| {
        if present {
            attribution.insert(key.to_string(), source.clone());
        }
    };
    mark("projects_root", file.projects_root.is_some());
    mark("playbooks_root", file.playbooks_root.is_some());
    mark("reference_root", file.reference_root.is_some());
    mark("default_llm", file.defaults.default_llm.is_some());
    mark("enabled_llms", file.defaults.enabled_llms.is_some());
    mark("runner.max_concurrent", file.runner.max_concurrent.is_some());
    mark("runner.max_rounds", file.runner.max_rounds.is_some());
    mark("runner.round_delay_seconds", file.runner.round_delay_seconds.is_some());
    mark("runner.buffer_pct", file.runner.buffer_pct.is_some());
    mark("runner.dispatch_timeout_seconds", file.runner.dispatch_timeout_seconds.is_some());
    mark("runner.rate_limit.max_requests", file.runner.rate_limit.max_requests.is_some());
    mark("runner.rate_limit.period_seconds", file.runner.rate_limit.period_seconds.is_some());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_when_no_file_and_no_overrides() {
        let resolved = load(None, &CliOverrides::default()).unwrap();
        assert_eq!(resolved.engine.runner.max_concurrent, RunnerConfig::default().max_concurrent);
        assert_eq!(resolved.source_attribution["runner.max_concurrent"], ConfigSource::Default);
    }

    #[test]
    fn cli_override_wins_over_file_value() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), "[runner]\nmax_concurrent = 9\n").unwrap();
        let path = Utf8PathBuf::from_path_buf(config_dir.join(CONFIG_FILE_NAME)).unwrap();

        let overrides = CliOverrides { max_concurrent: Some(2), ..Default::default() };
        let resolved = load(Some(&path), &overrides).unwrap();
        assert_eq!(resolved.engine.runner.max_concurrent, 2);
        assert_eq!(resolved.source_attribution["runner.max_concurrent"], ConfigSource::Cli);
    }

    #[test]
    fn file_value_wins_over_default_when_no_override() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), "[runner]\nmax_rounds = 7\n").unwrap();
        let path = Utf8PathBuf::from_path_buf(config_dir.join(CONFIG_FILE_NAME)).unwrap();

        let resolved = load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(resolved.engine.runner.max_rounds, 7);
        matches!(resolved.source_attribution["runner.max_rounds"], ConfigSource::ConfigFile(_));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "not = [valid").unwrap();
        let path = Utf8PathBuf::from_path_buf(bad).unwrap();
        assert!(matches!(load(Some(&path), &CliOverrides::default()), Err(ConfigError::Parse(_, _))));
    }
}

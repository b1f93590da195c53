//! Runner-facing configuration: the knobs listed in the external-interfaces
//! section, owned here because the engine is what actually consumes them —
//! the root binary only parses a config file into this shape.

use std::collections::HashMap;
use std::time::Duration;
use taskwright_limits::RecoveryConfig;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub period_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            period_seconds: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent: usize,
    pub max_rounds: u32,
    pub round_delay_seconds: u64,
    pub rate_limit: RateLimitConfig,
    pub buffer_pct: f64,
    pub dispatch_timeout_seconds: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_rounds: 3,
            round_delay_seconds: 5,
            rate_limit: RateLimitConfig::default(),
            buffer_pct: 0.10,
            dispatch_timeout_seconds: 120,
        }
    }
}

/// Per-LLM configuration: recovery schedule and the stderr patterns that
/// should be treated as a rate-limit signal rather than a hard failure.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub recovery: Option<RecoveryConfig>,
    pub test_prompt: String,
    pub rate_limit_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub runner: RunnerConfig,
    pub default_llm: String,
    pub enabled_llms: Vec<String>,
    pub llms: HashMap<String, LlmConfig>,
}

impl EngineConfig {
    /// Resolves an empty or `"default"` model id to the configured default,
    /// falling back to the first enabled LLM if no default is set.
    #[must_use]
    pub fn resolve_llm_id(&self, requested: Option<&str>) -> String {
        match requested {
            Some(id) if !id.is_empty() && id != "default" => id.to_string(),
            _ => {
                if !self.default_llm.is_empty() {
                    self.default_llm.clone()
                } else {
                    self.enabled_llms.first().cloned().unwrap_or_default()
                }
            }
        }
    }

    #[must_use]
    pub fn llm_config(&self, llm_id: &str) -> Option<&LlmConfig> {
        self.llms.get(llm_id)
    }

    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.dispatch_timeout_seconds)
    }
}

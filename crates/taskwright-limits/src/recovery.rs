//! Degraded-LLM recovery scheduling. When a configured LLM starts failing
//! with exit codes or stderr patterns that look like a provider-side rate
//! limit or outage, the runner stops sending it new work and this
//! controller tracks how long to wait before probing again.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub test_schedule: Vec<Duration>,
    pub abort_after: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            test_schedule: vec![Duration::from_secs(30)],
            abort_after: Duration::from_secs(12 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct RecoveryState {
    entered_at: DateTime<Utc>,
    schedule_index: usize,
    degraded_llm: String,
}

pub struct RecoveryController {
    config: RecoveryConfig,
    state: Mutex<Option<RecoveryState>>,
}

impl RecoveryController {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    pub fn is_in_recovery(&self) -> bool {
        self.state.lock().expect("recovery mutex poisoned").is_some()
    }

    pub fn degraded_llm(&self) -> Option<String> {
        self.state
            .lock()
            .expect("recovery mutex poisoned")
            .as_ref()
            .map(|s| s.degraded_llm.clone())
    }

    /// Record a failure on `llm`. If already in recovery on the same LLM,
    /// the schedule index is left alone — only `entered_at` is refreshed,
    /// extending how long the run will wait before aborting.
    pub fn enter_recovery(&self, llm: &str, now: DateTime<Utc>) {
        let mut guard = self.state.lock().expect("recovery mutex poisoned");
        match guard.as_mut() {
            Some(existing) if existing.degraded_llm == llm => {
                existing.entered_at = now;
            }
            _ => {
                *guard = Some(RecoveryState {
                    entered_at: now,
                    schedule_index: 0,
                    degraded_llm: llm.to_string(),
                });
            }
        }
    }

    /// Called after a successful probe brings the LLM back; clears state.
    pub fn exit_recovery(&self) {
        *self.state.lock().expect("recovery mutex poisoned") = None;
    }

    /// Called after a failed probe, to move further out along the backoff
    /// schedule (clamped to the final entry).
    pub fn advance_schedule(&self) {
        if let Some(state) = self.state.lock().expect("recovery mutex poisoned").as_mut() {
            state.schedule_index += 1;
        }
    }

    pub fn should_abort(&self, now: DateTime<Utc>) -> bool {
        match self.state.lock().expect("recovery mutex poisoned").as_ref() {
            Some(state) => {
                let elapsed = now.signed_duration_since(state.entered_at);
                elapsed
                    .to_std()
                    .map(|d| d > self.config.abort_after)
                    .unwrap_or(false)
            }
            None => false,
        }
    }

    pub fn wait_duration(&self) -> Duration {
        let guard = self.state.lock().expect("recovery mutex poisoned");
        let index = guard.as_ref().map(|s| s.schedule_index).unwrap_or(0);
        let last = self.config.test_schedule.len().saturating_sub(1);
        self.config
            .test_schedule
            .get(index.min(last))
            .copied()
            .unwrap_or(Duration::from_secs(30))
    }
}

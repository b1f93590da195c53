//! Per-run call budget, grounded on the attempted-calls-not-successful-
//! calls counting discipline of a wrapped-backend budget limiter: the
//! counter increments whether or not the call it's guarding eventually
//! succeeds, so a task that keeps erroring out cannot dodge the cap by
//! retrying.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-task limits used to derive the total budget for a run.
#[derive(Debug, Clone, Copy)]
pub struct TaskLimits {
    pub max_worker_calls: u32,
    pub max_qa_calls: u32,
    pub qa_enabled: bool,
}

pub struct Budget {
    used: AtomicU32,
    exceeded: AtomicBool,
    max_calls: u32,
}

impl Budget {
    /// `maxCalls = ceil(Σ_tasks (maxWorker + (qaEnabled ? maxQA : 0)) * (1 + bufferPct))`.
    pub fn new(tasks: &[TaskLimits], buffer_pct: f64) -> Self {
        let raw: u32 = tasks
            .iter()
            .map(|t| t.max_worker_calls + if t.qa_enabled { t.max_qa_calls } else { 0 })
            .sum();
        let max_calls = ((raw as f64) * (1.0 + buffer_pct)).ceil() as u32;

        Self {
            used: AtomicU32::new(0),
            exceeded: AtomicBool::new(false),
            max_calls,
        }
    }

    pub fn with_buffer_default(tasks: &[TaskLimits]) -> Self {
        Self::new(tasks, 0.10)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }

    /// Atomically record one more call attempt. Returns `true` if the call
    /// is within budget. Once the limit is crossed the `exceeded` flag
    /// becomes sticky: every subsequent call returns `false` without
    /// incrementing `used` further.
    pub fn check_and_increment(&self) -> bool {
        if self.exceeded.load(Ordering::SeqCst) {
            return false;
        }

        let prior = self.used.fetch_add(1, Ordering::SeqCst);
        if prior >= self.max_calls {
            self.exceeded.store(true, Ordering::SeqCst);
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limits(max_worker: u32, max_qa: u32, qa_enabled: bool) -> TaskLimits {
        TaskLimits {
            max_worker_calls: max_worker,
            max_qa_calls: max_qa,
            qa_enabled,
        }
    }

    #[test]
    fn computes_ceil_with_buffer() {
        let tasks = vec![limits(3, 2, true), limits(3, 2, false)];
        // (3+2) + (3+0) = 8, * 1.10 = 8.8 -> ceil 9
        let budget = Budget::new(&tasks, 0.10);
        assert_eq!(budget.max_calls(), 9);
    }

    #[test]
    fn allows_calls_under_limit_and_blocks_after() {
        let budget = Budget::new(&[limits(1, 0, false)], 0.0);
        assert_eq!(budget.max_calls(), 1);
        assert!(budget.check_and_increment());
        assert!(!budget.check_and_increment());
    }

    #[test]
    fn exceeded_flag_is_sticky_and_stops_further_increments() {
        let budget = Budget::new(&[limits(1, 0, false)], 0.0);
        assert!(budget.check_and_increment());
        assert!(!budget.is_exceeded());

        assert!(!budget.check_and_increment());
        assert!(budget.is_exceeded());
        let used_after_first_overflow = budget.used();

        assert!(!budget.check_and_increment());
        assert_eq!(budget.used(), used_after_first_overflow);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]
        #[test]
        fn max_calls_matches_the_ceil_buffered_sum(
            calls in prop::collection::vec((0u32..20, 0u32..20, any::<bool>()), 0..8),
            buffer_pct in 0.0f64..2.0,
        ) {
            let tasks: Vec<TaskLimits> = calls
                .iter()
                .map(|&(worker, qa, enabled)| limits(worker, qa, enabled))
                .collect();
            let budget = Budget::new(&tasks, buffer_pct);

            let raw: u32 = calls.iter().map(|&(worker, qa, enabled)| worker + if enabled { qa } else { 0 }).sum();
            let expected = ((raw as f64) * (1.0 + buffer_pct)).ceil() as u32;
            prop_assert_eq!(budget.max_calls(), expected);
        }

        #[test]
        fn check_and_increment_allows_exactly_max_calls_successes(max_calls in 0u32..25) {
            let budget = Budget::new(&[limits(max_calls, 0, false)], 0.0);
            let mut successes = 0u32;
            for _ in 0..(max_calls + 5) {
                if budget.check_and_increment() {
                    successes += 1;
                }
            }
            prop_assert_eq!(successes, max_calls);
            prop_assert!(budget.is_exceeded());
        }
    }
}

//! Cumulative time budget amortized across a batch.
//!
//! The batch as a whole gets `n_items x per_item_budget` seconds. Each item
//! is granted `min(per_item_budget x slack, remaining)` so slow items can
//! spend time that fast items saved, while the batch total stays bounded.
//! The watchdog is advisory: only the LLM dispatch honors its deadline.

use std::time::Duration;

/// Tracks cumulative elapsed time against the batch budget and yields
/// per-item deadlines. Created at batch start, destroyed at batch end;
/// mutated only by the synchronous batch thread.
#[derive(Debug)]
pub struct BudgetWatchdog {
    batch_budget: Duration,
    cumulative_elapsed: Duration,
    per_item: Duration,
    slack: f64,
}

impl BudgetWatchdog {
    /// Budget for a batch of `n_items`, each granted `per_item_budget_s`
    /// seconds amortized, stretchable per item by `slack`
    pub fn new(n_items: usize, per_item_budget_s: f64, slack: f64) -> Self {
        let per_item = Duration::from_secs_f64(per_item_budget_s.max(0.0));
        Self {
            batch_budget: per_item * n_items as u32,
            cumulative_elapsed: Duration::ZERO,
            per_item,
            slack: slack.max(1.0),
        }
    }

    /// Deadline granted to the item about to start
    pub fn begin_item(&self) -> Duration {
        self.per_item.mul_f64(self.slack).min(self.remaining())
    }

    /// Record the wall time an item consumed
    pub fn end_item(&mut self, elapsed: Duration) {
        self.cumulative_elapsed = self.cumulative_elapsed.saturating_add(elapsed);
    }

    /// Budget not yet consumed
    pub fn remaining(&self) -> Duration {
        self.batch_budget.saturating_sub(self.cumulative_elapsed)
    }

    /// Whether the batch budget is exhausted
    pub fn check(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Total budget granted to the batch
    pub fn batch_budget(&self) -> Duration {
        self.batch_budget
    }

    /// Time consumed so far
    pub fn cumulative_elapsed(&self) -> Duration {
        self.cumulative_elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_slack_capped_early_in_batch() {
        let watchdog = BudgetWatchdog::new(6, 10.0, 1.5);
        // Plenty of budget left; the per-item cap applies
        assert_eq!(watchdog.begin_item(), Duration::from_secs_f64(15.0));
    }

    #[test]
    fn test_fast_items_leave_budget_for_slow_ones() {
        let mut watchdog = BudgetWatchdog::new(6, 10.0, 1.5);
        for _ in 0..5 {
            watchdog.begin_item();
            watchdog.end_item(Duration::from_secs_f64(0.05));
        }
        // 60 - 0.25 = 59.75s remain; the last item still gets the slack cap
        assert_eq!(
            watchdog.remaining(),
            Duration::from_secs_f64(59.75)
        );
        assert_eq!(watchdog.begin_item(), Duration::from_secs_f64(15.0));
    }

    #[test]
    fn test_deadline_shrinks_to_remaining() {
        let mut watchdog = BudgetWatchdog::new(2, 10.0, 1.5);
        watchdog.end_item(Duration::from_secs_f64(19.5));
        assert_eq!(watchdog.begin_item(), Duration::from_secs_f64(0.5));
    }

    #[test]
    fn test_exhausted_budget_yields_zero_deadline() {
        let mut watchdog = BudgetWatchdog::new(1, 10.0, 1.5);
        assert!(!watchdog.check());
        watchdog.end_item(Duration::from_secs_f64(30.0));
        assert!(watchdog.check());
        assert_eq!(watchdog.begin_item(), Duration::ZERO);
        assert_eq!(watchdog.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_cumulative_is_monotone() {
        let mut watchdog = BudgetWatchdog::new(3, 10.0, 1.5);
        watchdog.end_item(Duration::from_secs_f64(1.0));
        watchdog.end_item(Duration::from_secs_f64(2.0));
        assert_eq!(
            watchdog.cumulative_elapsed(),
            Duration::from_secs_f64(3.0)
        );
        assert_eq!(watchdog.batch_budget(), Duration::from_secs_f64(30.0));
    }
}

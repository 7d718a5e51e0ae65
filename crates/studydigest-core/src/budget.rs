//! Generation-length planning against a fixed context window.
//!
//! ```text
//! input     = estimate(prompt)
//! buffer    = max(256, window / 10)
//! available = window - input - buffer
//! max_tokens = clamp(available, 256, configured_max)
//! ```
//!
//! When the prompt leaves less than the floor, possibly nothing at all, the
//! plan still returns the floor and the generation call may fail on the
//! service side. [`BudgetPlan::over_budget`] makes that case visible to
//! callers.

use crate::error::ConfigError;
use crate::tokens::TokenEstimator;

pub const MIN_GENERATION_TOKENS: usize = 256;
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;
pub const DEFAULT_MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPlan {
    pub input_tokens: usize,
    pub buffer: usize,
    /// May be zero or negative.
    pub available: i64,
    pub max_tokens: usize,
    pub over_budget: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudgetPlanner {
    context_window: usize,
    max_tokens: usize,
    estimator: TokenEstimator,
}

impl Default for TokenBudgetPlanner {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_tokens: DEFAULT_MAX_TOKENS,
            estimator: TokenEstimator::default(),
        }
    }
}

impl TokenBudgetPlanner {
    /// # Errors
    ///
    /// `max_tokens` below the 256 floor leaves no valid clamp range.
    pub fn new(context_window: usize, max_tokens: usize) -> Result<Self, ConfigError> {
        if max_tokens < MIN_GENERATION_TOKENS {
            return Err(ConfigError(format!(
                "max_tokens ({}) must be at least {}",
                max_tokens, MIN_GENERATION_TOKENS
            )));
        }
        if context_window == 0 {
            return Err(ConfigError("context_window must be > 0".to_string()));
        }
        Ok(Self {
            context_window,
            max_tokens,
            estimator: TokenEstimator::default(),
        })
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Generation cap for `prompt`, always in `256..=max_tokens`.
    pub fn plan(&self, prompt: &str) -> usize {
        self.plan_detailed(prompt).max_tokens
    }

    pub fn plan_detailed(&self, prompt: &str) -> BudgetPlan {
        self.plan_for_tokens(self.estimator.estimate(prompt))
    }

    pub fn plan_for_tokens(&self, input_tokens: usize) -> BudgetPlan {
        let buffer = MIN_GENERATION_TOKENS.max(self.context_window / 10);
        let available = self.context_window as i64 - input_tokens as i64 - buffer as i64;
        let max_tokens = available.clamp(MIN_GENERATION_TOKENS as i64, self.max_tokens as i64) as usize;
        BudgetPlan {
            input_tokens,
            buffer,
            available,
            max_tokens,
            over_budget: available < MIN_GENERATION_TOKENS as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_within_window() {
        let planner = TokenBudgetPlanner::new(4096, 1024).unwrap();
        // 1000 tokens of prompt: 4096 - 1000 - 409 = 2687 → capped at 1024
        let plan = planner.plan_for_tokens(1000);
        assert_eq!(plan.buffer, 409);
        assert_eq!(plan.available, 2687);
        assert_eq!(plan.max_tokens, 1024);
        assert!(!plan.over_budget);
    }

    #[test]
    fn test_plan_between_floor_and_cap() {
        let planner = TokenBudgetPlanner::new(4096, 1024).unwrap();
        let plan = planner.plan_for_tokens(3000);
        assert_eq!(plan.available, 687);
        assert_eq!(plan.max_tokens, 687);
    }

    #[test]
    fn test_small_window_uses_minimum_buffer() {
        let planner = TokenBudgetPlanner::new(2000, 1024).unwrap();
        assert_eq!(planner.plan_for_tokens(0).buffer, 256);
    }

    #[test]
    fn test_exhausted_window_floors() {
        let planner = TokenBudgetPlanner::new(4096, 1024).unwrap();
        let plan = planner.plan_for_tokens(5000);
        assert!(plan.available < 0);
        assert_eq!(plan.max_tokens, 256);
        assert!(plan.over_budget);
    }

    #[test]
    fn test_result_always_in_range() {
        let planner = TokenBudgetPlanner::new(8192, 2048).unwrap();
        for input in (0..20_000).step_by(137) {
            let t = planner.plan_for_tokens(input).max_tokens;
            assert!((256..=2048).contains(&t), "input {} gave {}", input, t);
        }
    }

    #[test]
    fn test_plan_estimates_prompt() {
        let planner = TokenBudgetPlanner::new(4096, 4096).unwrap();
        // 2500 chars → 1000 tokens
        assert_eq!(planner.plan(&"p".repeat(2500)), 4096 - 1000 - 409);
    }

    #[test]
    fn test_rejects_cap_below_floor() {
        assert!(TokenBudgetPlanner::new(4096, 100).is_err());
    }
}

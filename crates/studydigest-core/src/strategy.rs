//! Size-based choice of summarization strategy.
//!
//! | Estimated tokens `t` | Strategy |
//! |----------------------|----------|
//! | `t < 3500` | [`Simple`](SummaryMode::Simple): one call over the whole text |
//! | `3500 ≤ t < 15000` | [`Recursive`](SummaryMode::Recursive): fixed overlapping windows |
//! | `t ≥ 15000` | [`Semantic`](SummaryMode::Semantic): embedding-grouped paragraphs |

use crate::error::ConfigError;
use crate::models::SummaryMode;
use crate::tokens::TokenEstimator;

pub const DEFAULT_SIMPLE_MAX_TOKENS: usize = 3500;
pub const DEFAULT_SEMANTIC_MIN_TOKENS: usize = 15000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategySelector {
    simple_max_tokens: usize,
    semantic_min_tokens: usize,
    estimator: TokenEstimator,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self {
            simple_max_tokens: DEFAULT_SIMPLE_MAX_TOKENS,
            semantic_min_tokens: DEFAULT_SEMANTIC_MIN_TOKENS,
            estimator: TokenEstimator::default(),
        }
    }
}

impl StrategySelector {
    /// `simple_max_tokens` is exclusive: a text estimated at exactly that
    /// many tokens is already recursive.
    pub fn new(
        simple_max_tokens: usize,
        semantic_min_tokens: usize,
        estimator: TokenEstimator,
    ) -> Result<Self, ConfigError> {
        if simple_max_tokens > semantic_min_tokens {
            return Err(ConfigError(format!(
                "simple threshold ({}) must not exceed semantic threshold ({})",
                simple_max_tokens, semantic_min_tokens
            )));
        }
        Ok(Self {
            simple_max_tokens,
            semantic_min_tokens,
            estimator,
        })
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Pick the strategy for already-normalized text.
    pub fn select(&self, text: &str) -> SummaryMode {
        self.select_for_tokens(self.estimator.estimate(text))
    }

    pub fn select_for_tokens(&self, tokens: usize) -> SummaryMode {
        if tokens < self.simple_max_tokens {
            SummaryMode::Simple
        } else if tokens < self.semantic_min_tokens {
            SummaryMode::Recursive
        } else {
            SummaryMode::Semantic
        }
    }
}

//! Character-ratio token estimation.
//!
//! Used for strategy thresholds and budget arithmetic only. The default
//! ratio of 2.5 characters per token is deliberately coarse so that
//! CJK-heavy text is not underestimated.

use crate::error::ConfigError;

/// Default characters-per-token ratio.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 2.5;

/// Approximates token counts as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    pub fn new(chars_per_token: f64) -> Result<Self, ConfigError> {
        if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
            return Err(ConfigError(format!(
                "chars_per_token must be a positive number, got {}",
                chars_per_token
            )));
        }
        Ok(Self { chars_per_token })
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Estimate tokens for `text`, counting Unicode scalar values.
    pub fn estimate(&self, text: &str) -> usize {
        self.for_chars(text.chars().count())
    }

    /// Estimate tokens for a known character count.
    pub fn for_chars(&self, chars: usize) -> usize {
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Estimate tokens with the default ratio.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().estimate(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdef"), 3);
    }

    #[test]
    fn test_exact_thresholds() {
        let est = TokenEstimator::default();
        assert_eq!(est.for_chars(8_750), 3_500);
        assert_eq!(est.for_chars(37_500), 15_000);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // 5 CJK characters = 15 bytes
        assert_eq!(estimate_tokens("学习笔记本"), 2);
    }

    #[test]
    fn test_monotonic() {
        let est = TokenEstimator::default();
        let mut prev = 0;
        for n in 0..2_000 {
            let t = est.for_chars(n);
            assert!(t >= prev, "estimate decreased at {}", n);
            prev = t;
        }
    }

    #[test]
    fn test_custom_ratio() {
        let est = TokenEstimator::new(4.0).unwrap();
        assert_eq!(est.for_chars(8), 2);
        assert_eq!(est.for_chars(9), 3);
    }

    #[test]
    fn test_rejects_invalid_ratio() {
        assert!(TokenEstimator::new(0.0).is_err());
        assert!(TokenEstimator::new(-1.0).is_err());
        assert!(TokenEstimator::new(f64::NAN).is_err());
    }
}

//! Length-bounded context assembly from ranked fragments.
//!
//! Fragments are taken in rank order. Each one is rendered as a numbered
//! header line followed by its text cut to `per_fragment_chars`. A
//! fragment is charged its *full* length against `total_chars`, so a few
//! long fragments exhaust the budget quickly even though only their capped
//! form is emitted. Assembly stops at the first fragment whose charge does
//! not fit; fragments are never split to fill the remainder.
//!
//! The top-ranked fragment is the one exception: it is admitted whenever
//! its capped rendering fits, so an oversized best match is not lost.

use serde::{Deserialize, Serialize};

use crate::models::RetrievalCandidate;

const SEPARATOR: &str = "\n\n";

/// Character budgets for one assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub total_chars: usize,
    pub per_fragment_chars: usize,
}

impl ContextBudget {
    /// Short answers, small prompts.
    pub const fn compact() -> Self {
        Self {
            total_chars: 2000,
            per_fragment_chars: 300,
        }
    }

    pub const fn full() -> Self {
        Self {
            total_chars: 5000,
            per_fragment_chars: 1000,
        }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::compact()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssembledContext {
    pub text: String,
    /// Number of leading fragments of the ranked input that were used.
    pub included: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.included == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextAssembler {
    budget: ContextBudget,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Build the context string. Deterministic for the same input.
    pub fn assemble(&self, ranked: &[RetrievalCandidate]) -> AssembledContext {
        let mut text = String::new();
        let mut used = 0usize;
        let mut included = 0usize;

        for (i, candidate) in ranked.iter().enumerate() {
            let header = format!("[{}]\n", i + 1);
            let sep = if i == 0 { 0 } else { SEPARATOR.len() };
            let header_len = header.chars().count();
            let full_len = candidate.chunk.text.chars().count();
            let body: String = candidate
                .chunk
                .text
                .chars()
                .take(self.budget.per_fragment_chars)
                .collect();
            let rendered_len = sep + header_len + body.chars().count();

            let charge = sep + header_len + full_len;
            let admit = if i == 0 {
                rendered_len <= self.budget.total_chars
            } else {
                used + charge <= self.budget.total_chars
            };
            if !admit {
                break;
            }

            if i > 0 {
                text.push_str(SEPARATOR);
            }
            text.push_str(&header);
            text.push_str(&body);
            used += charge;
            included += 1;
        }

        AssembledContext { text, included }
    }
}

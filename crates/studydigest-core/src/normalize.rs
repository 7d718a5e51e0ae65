//! Input cleanup applied before any size decision is made.
//!
//! # Algorithm
//!
//! 1. Drop zero-width characters; turn non-breaking spaces into spaces.
//! 2. Normalize line endings to `\n`.
//! 3. Collapse whitespace runs inside each line to a single space and trim
//!    the line.
//! 4. Drop repeated non-blank lines (first occurrence wins, case-sensitive).
//! 5. Keep at most two consecutive blank lines.
//! 6. Trim, then cap the length in characters. A cut text ends with
//!    [`TRUNCATION_MARKER`] and still fits inside the cap.

use std::collections::HashSet;

/// Default hard ceiling on normalized text length, in characters.
///
/// Large enough that the semantic strategy (≥ 37,500 characters at the
/// default token ratio) stays reachable.
pub const DEFAULT_MAX_CHARS: usize = 120_000;

/// Appended to text that was cut at the length cap.
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]";

const MAX_BLANK_RUN: usize = 2;

/// Whitespace, duplicate-line and length cleanup of raw document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextNormalizer {
    max_chars: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl TextNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Normalize `raw`. Never fails; the result may be empty.
    ///
    /// The returned string is at most [`max_chars`](Self::max_chars)
    /// characters long.
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned: String = raw
            .chars()
            .filter(|c| !is_zero_width(*c))
            .map(|c| if is_nbsp(c) { ' ' } else { c })
            .collect();
        let cleaned = cleaned.replace("\r\n", "\n").replace('\r', "\n");

        let mut seen: HashSet<String> = HashSet::new();
        let mut lines: Vec<String> = Vec::new();
        let mut blank_run = 0usize;

        for line in cleaned.split('\n') {
            let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                blank_run += 1;
                if blank_run <= MAX_BLANK_RUN {
                    lines.push(String::new());
                }
                continue;
            }
            // A dropped duplicate is transparent: blank lines around it
            // count as one run.
            if !seen.insert(collapsed.clone()) {
                continue;
            }
            blank_run = 0;
            lines.push(collapsed);
        }

        let joined = lines.join("\n");
        self.truncate(joined.trim())
    }

    fn truncate(&self, text: &str) -> String {
        let len = text.chars().count();
        if len <= self.max_chars {
            return text.to_string();
        }

        let marker_len = TRUNCATION_MARKER.chars().count();
        if self.max_chars <= marker_len {
            return text.chars().take(self.max_chars).collect();
        }

        let mut out: String = text.chars().take(self.max_chars - marker_len).collect();
        out.push_str(TRUNCATION_MARKER);
        out
    }
}

/// Normalize with the default cap.
pub fn normalize_text(raw: &str) -> String {
    TextNormalizer::default().normalize(raw)
}

fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'
    )
}

fn is_nbsp(c: char) -> bool {
    matches!(c, '\u{00A0}' | '\u{202F}' | '\u{2007}')
}

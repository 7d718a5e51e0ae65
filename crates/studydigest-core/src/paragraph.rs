//! Paragraph splitting with size floor and ceiling.
//!
//! Paragraphs are separated by blank lines. Paragraphs shorter than the
//! floor are dropped as noise (page numbers, stray headings). Paragraphs
//! longer than the ceiling are re-cut on sentence boundaries into pieces
//! of at most `target_chars`, so no single unit dominates a semantic chunk.

use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_MIN_PARAGRAPH_CHARS: usize = 50;
pub const DEFAULT_MAX_PARAGRAPH_CHARS: usize = 2000;
pub const DEFAULT_TARGET_PARAGRAPH_CHARS: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphSplitter {
    min_chars: usize,
    max_chars: usize,
    target_chars: usize,
}

impl Default for ParagraphSplitter {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_PARAGRAPH_CHARS,
            max_chars: DEFAULT_MAX_PARAGRAPH_CHARS,
            target_chars: DEFAULT_TARGET_PARAGRAPH_CHARS,
        }
    }
}

impl ParagraphSplitter {
    /// Paragraphs shorter than `min_chars` are dropped; longer than
    /// `max_chars` are re-cut on sentence boundaries into pieces of at most
    /// `target_chars`.
    ///
    /// Fails unless `1 <= target_chars <= max_chars`.
    pub fn new(min_chars: usize, max_chars: usize, target_chars: usize) -> Result<Self, ConfigError> {
        if target_chars == 0 || target_chars > max_chars {
            return Err(ConfigError(format!(
                "paragraph target ({}) must be in 1..={}",
                target_chars, max_chars
            )));
        }
        Ok(Self {
            min_chars,
            max_chars,
            target_chars,
        })
    }

    /// Split `text` into paragraph units, in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut units = Vec::new();
        let mut dropped = 0usize;

        for para in blank_line_paragraphs(text) {
            let len = para.chars().count();
            if len < self.min_chars {
                dropped += 1;
                continue;
            }
            if len > self.max_chars {
                units.extend(pack_sentences(&split_sentences(&para), self.target_chars));
            } else {
                units.push(para);
            }
        }

        if dropped > 0 {
            debug!(dropped, kept = units.len(), "dropped short paragraphs");
        }
        units
    }
}

fn blank_line_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }
    paragraphs
}

/// Split into sentences, keeping terminators. Latin `.`, `!`, `?` end a
/// sentence only when followed by whitespace; CJK full-width terminators
/// and newlines always do.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let ends = match c {
            '。' | '！' | '？' | '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |n| n.is_whitespace()),
            _ => false,
        };
        if ends {
            let s = current.trim();
            if !s.is_empty() {
                sentences.push(s.to_string());
            }
            current.clear();
        }
    }
    let s = current.trim();
    if !s.is_empty() {
        sentences.push(s.to_string());
    }
    sentences
}

/// Greedily pack sentences into pieces of at most `target` characters.
/// A sentence longer than `target` is hard-cut.
fn pack_sentences(sentences: &[String], target: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let len = sentence.chars().count();
        if current_len > 0 && current_len + 1 + len > target {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len > target {
            let chars: Vec<char> = sentence.chars().collect();
            for piece in chars.chunks(target) {
                pieces.push(piece.iter().collect());
            }
            continue;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }
    if current_len > 0 {
        pieces.push(current);
    }
    pieces
}

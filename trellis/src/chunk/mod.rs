//! Text normalization and chunking for the embedding pipeline.
//!
//! Chunks overlap so that sentences straddling a boundary stay retrievable
//! from either side. Chunking never fails the job: any internal error
//! degrades to a single best-effort chunk.

use tracing::warn;

/// Chunker configuration. The last chunk of a text may be smaller than
/// `min_chunk_size` only when the whole text is.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
    pub min_chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 8000,
            min_chunk_size: 100,
            overlap_size: 200,
        }
    }
}

/// Break-point candidates in preference order. Within the search window the
/// first kind with any match wins; among positions of that kind, the latest
/// (largest chunk) wins.
const BREAK_PATTERNS: [&str; 5] = [". ", "! ", "? ", "\n\n", "\n"];

/// How far back from the candidate end to look for a natural break.
const BREAK_WINDOW: usize = 100;

/// Normalizes and splits text into overlapping chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Normalization, in order: trim; collapse whitespace runs to a single
    /// space; collapse newline runs to a single newline; replace anything
    /// outside the allowed character set with a space.
    ///
    /// The output is ASCII-only, so downstream byte indexing is char-safe.
    pub fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim();

        // Collapse horizontal whitespace runs to one space, newline runs to
        // one newline (CR counts toward the newline run).
        let mut collapsed = String::with_capacity(trimmed.len());
        let mut pending_space = false;
        let mut pending_newline = false;
        for c in trimmed.chars() {
            if c == '\n' || c == '\r' {
                pending_newline = true;
                pending_space = false;
            } else if c.is_whitespace() {
                if !pending_newline {
                    pending_space = true;
                }
            } else {
                if pending_newline {
                    collapsed.push('\n');
                } else if pending_space {
                    collapsed.push(' ');
                }
                pending_newline = false;
                pending_space = false;
                collapsed.push(c);
            }
        }

        collapsed
            .chars()
            .map(|c| if Self::is_allowed(c) { c } else { ' ' })
            .collect()
    }

    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                ' ' | '.'
                    | ','
                    | '?'
                    | '!'
                    | ';'
                    | ':'
                    | '('
                    | ')'
                    | '['
                    | ']'
                    | '{'
                    | '}'
                    | '"'
                    | '\''
                    | '`'
                    | '-'
                    | '\n'
            )
    }

    /// Splits normalized text into overlapping chunks at natural break points.
    ///
    /// Expects normalized (ASCII) input; [`Chunker::process`] handles the
    /// composition with [`Chunker::normalize`] and the fallback behavior.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.chunk_inner(text).unwrap_or_else(|| {
            warn!(
                len = text.len(),
                "chunking degraded to single best-effort chunk"
            );
            vec![self.fallback_chunk(text)]
        })
    }

    /// Chunk ∘ normalize with fallback: any chunking failure yields a single
    /// best-effort chunk instead of an error.
    pub fn process(&self, text: &str) -> Vec<String> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }
        self.chunk(&normalized)
    }

    fn fallback_chunk(&self, text: &str) -> String {
        let cut = text
            .char_indices()
            .nth(self.config.max_chunk_size)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        self.normalize(&text[..cut])
    }

    /// Returns None when an index went inconsistent; the caller degrades to a
    /// single chunk rather than failing the job.
    fn chunk_inner(&self, text: &str) -> Option<Vec<String>> {
        let len = text.len();
        if len <= self.config.max_chunk_size {
            return Some(vec![text.to_string()]);
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let hard_end = start.checked_add(self.config.max_chunk_size)?;
            let end = if hard_end < len {
                self.find_break(text, start, hard_end)
            } else {
                len
            };
            if end <= start || end > len {
                return None;
            }

            let piece = text.get(start..end)?.trim();
            if piece.len() >= self.config.min_chunk_size {
                chunks.push(piece.to_string());
            }

            if end >= len {
                break;
            }
            let next = end.saturating_sub(self.config.overlap_size);
            // Forward-progress guards.
            if next <= start {
                break;
            }
            start = next;
            if start >= len.saturating_sub(self.config.min_chunk_size) {
                break;
            }
        }
        Some(chunks)
    }

    /// Seeks a natural break in `[end - BREAK_WINDOW, end]`, preferring
    /// sentence ends, then paragraph breaks, then newlines, then the last
    /// space at or before `end`. The break character is included in the chunk.
    fn find_break(&self, text: &str, start: usize, end: usize) -> usize {
        let window_start = end.saturating_sub(BREAK_WINDOW).max(start);
        let window = &text[window_start..end];

        for pattern in BREAK_PATTERNS {
            if let Some(pos) = window.rfind(pattern) {
                return window_start + pos + 1;
            }
        }
        if let Some(pos) = text[start..end].rfind(' ') {
            if pos > 0 {
                return start + pos + 1;
            }
        }
        end
    }
}

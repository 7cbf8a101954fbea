//! Fixed token-window chunker with overlap and soft-break preference.

use lorebase_core::{ChunkPiece, TokenCounter};

/// Token-window chunker.
///
/// `size` and `overlap` are in tokens. Within ±10% of the target window
/// end, the chunker prefers to break at a blank line (the extractor's
/// soft-break marker), then a line break, then a sentence end.
#[derive(Debug, Clone)]
pub struct TokenChunker {
    size: usize,
    overlap: usize,
}

impl TokenChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    /// Split `text` into chunks. Whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str, counter: &dyn TokenCounter) -> Vec<ChunkPiece> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let total_tokens = counter.count_tokens(text).max(1);
        if total_tokens <= self.size {
            return vec![ChunkPiece {
                text: text.to_string(),
                token_count: total_tokens as u32,
                char_start: 0,
                char_end: text.chars().count() as u32,
            }];
        }

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        // Character window derived from the observed token density of this
        // text, so the window tracks the counter instead of a fixed guess.
        let chars_per_token = (total_chars as f64 / total_tokens as f64).max(1.0);
        let target_chars = (((self.size as f64) * chars_per_token).round() as usize).max(1);
        let overlap_chars = ((self.overlap as f64) * chars_per_token).round() as usize;

        let mut pieces = Vec::new();
        let mut start = 0usize;
        loop {
            let hard_end = (start + target_chars).min(total_chars);
            let end = find_break_point(&chars, start, hard_end, total_chars);

            let piece_text: String = chars[start..end].iter().collect();
            if !piece_text.trim().is_empty() {
                pieces.push(ChunkPiece {
                    token_count: counter.count_tokens(&piece_text) as u32,
                    text: piece_text,
                    char_start: start as u32,
                    char_end: end as u32,
                });
            }

            if end >= total_chars {
                break;
            }
            // Step back from the actual break point so the overlap survives
            // soft-break adjustment; progress is still mandatory.
            let mut next = end.saturating_sub(overlap_chars);
            if next <= start {
                next = end;
            }
            start = next;
        }

        pieces
    }
}

/// Pick a break point near `target_end`, searching within ±10% of the
/// window span. Preference order: blank line, line break, sentence end.
fn find_break_point(chars: &[char], start: usize, target_end: usize, total: usize) -> usize {
    if target_end >= total {
        return total;
    }

    let span = target_end - start;
    let slack = (span / 10).max(1);
    let lo = target_end.saturating_sub(slack).max(start + 1);
    let hi = (target_end + slack).min(total);

    // Blank line (soft break emitted by the extractor)
    for i in (lo..hi).rev() {
        if chars[i] == '\n' && i + 1 < total && chars[i + 1] == '\n' {
            return i + 2;
        }
    }

    // Line break
    for i in (lo..hi).rev() {
        if chars[i] == '\n' {
            return i + 1;
        }
    }

    // Sentence end followed by whitespace
    for i in (lo..hi).rev() {
        if matches!(chars[i], '.' | '!' | '?') && i + 1 < total && chars[i + 1].is_whitespace() {
            return i + 1;
        }
    }

    target_end
}

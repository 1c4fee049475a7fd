//! Sliding-window text chunker.
//!
//! Splits document text into overlapping chunks whose approximate token
//! counts fit the embedding model's window. Window and overlap are
//! configured in tokens and converted to characters with a fixed
//! chars-per-token ratio, so the unit stays consistent with the embedder.
//!
//! Chunk i+1 starts exactly `window - overlap` tokens after chunk i, so
//! consecutive chunks share `overlap` tokens at the seam. The final chunk
//! may be shorter. Identical input and parameters always produce
//! byte-identical chunk texts.

/// Approximate chars-per-token ratio for the embedding window.
const CHARS_PER_TOKEN: usize = 4;

/// A chunk of text produced by [`chunk_text`], before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Zero-based, dense position within the document.
    pub ordinal: i64,
    pub text: String,
    /// Approximate token count (`ceil(chars / 4)`).
    pub token_count: i64,
}

/// Split text into overlapping windows of `window_tokens`, stepping by
/// `window_tokens - overlap_tokens`. Empty or whitespace-only input
/// produces zero chunks. Splits respect UTF-8 character boundaries.
pub fn chunk_text(text: &str, window_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    debug_assert!(overlap_tokens < window_tokens);

    if text.trim().is_empty() {
        return Vec::new();
    }

    let window_chars = window_tokens * CHARS_PER_TOKEN;
    let stride_chars = (window_tokens - overlap_tokens) * CHARS_PER_TOKEN;

    // Byte offsets of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut ordinal: i64 = 0;

    loop {
        let end = (start + window_chars).min(total_chars);
        let slice = &text[boundaries[start]..boundaries[end]];
        let chars = end - start;
        chunks.push(TextChunk {
            ordinal,
            text: slice.to_string(),
            token_count: chars.div_ceil(CHARS_PER_TOKEN) as i64,
        });
        ordinal += 1;

        if end == total_chars {
            break;
        }
        start += stride_chars;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].token_count, 4); // ceil(13 / 4)
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", 512, 64).is_empty());
        assert!(chunk_text("   \n\t ", 512, 64).is_empty());
    }

    #[test]
    fn ordinals_are_dense_from_zero() {
        let text = "abcd".repeat(100);
        let chunks = chunk_text(&text, 10, 2);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i as i64);
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        // window = 10 tokens = 40 chars, overlap = 2 tokens = 8 chars
        let text: String = ('a'..='z').cycle().take(200).collect();
        let chunks = chunk_text(&text, 10, 2);
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].text.chars().rev().take(8).collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let next_head: String = pair[1].text.chars().take(8).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn last_chunk_may_be_shorter() {
        let text = "x".repeat(50); // window 40 chars, stride 32 chars
        let chunks = chunk_text(&text, 10, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 40);
        assert_eq!(chunks[1].text.chars().count(), 18);
    }

    #[test]
    fn deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let a = chunk_text(&text, 16, 4);
        let b = chunk_text(&text, 16, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_input_splits_on_char_boundaries() {
        let text = "héllo wörld ünïcode ".repeat(20);
        let chunks = chunk_text(&text, 8, 2);
        let reassembled: String = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    c.text.clone()
                } else {
                    c.text.chars().skip(8).collect()
                }
            })
            .collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn token_count_within_window() {
        let text = "word ".repeat(500);
        for chunk in chunk_text(&text, 32, 8) {
            assert!(chunk.token_count <= 32);
        }
    }
}

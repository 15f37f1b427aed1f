//! Overlapping-window text chunker.
//!
//! Splits document text into windows of at most `window` characters with
//! an `overlap`-character shared region between consecutive windows.
//! Splitting prefers paragraph (`\n\n`), then sentence (`. `), then word
//! boundaries before falling back to a hard cut. Windows and overlap are
//! counted in `char`s, so multi-byte text gets the same effective window
//! as ASCII.
//!
//! Invariants:
//! - every window is at most `window` characters;
//! - consecutive windows from one document share exactly the overlap
//!   region (the next window starts `overlap` characters before the
//!   previous one ended);
//! - text no longer than `window` yields exactly one chunk;
//! - empty or whitespace-only text yields no chunks.

/// Split `text` into overlapping windows.
///
/// `overlap` must be smaller than `window`; the engine's config validation
/// guarantees this for callers going through [`crate::config`].
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let remaining = &text[start..];
        let Some(window_bytes) = nth_char_boundary(remaining, window) else {
            // Fewer than `window` characters left; this is the last chunk.
            chunks.push(remaining.to_string());
            break;
        };
        let slice = &remaining[..window_bytes];

        // A boundary cut is only usable if it lands past the overlap
        // region, otherwise the next window could not make progress.
        let min_cut = nth_char_boundary(slice, overlap + 1).unwrap_or(slice.len());
        let cut = slice
            .rfind("\n\n")
            .map(|p| p + 2)
            .filter(|&p| p >= min_cut)
            .or_else(|| slice.rfind(". ").map(|p| p + 2).filter(|&p| p >= min_cut))
            .or_else(|| slice.rfind(' ').map(|p| p + 1).filter(|&p| p >= min_cut))
            .unwrap_or(slice.len());

        let end = start + cut;
        chunks.push(text[start..end].to_string());
        start = back_chars(text, end, overlap);
    }

    chunks
}

/// Byte offset of the boundary after the first `n` characters of `s`, or
/// `None` when `s` has no more than `n` characters.
fn nth_char_boundary(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

/// Byte offset `n` characters before the boundary `end` (clamped at 0).
fn back_chars(s: &str, end: usize, n: usize) -> usize {
    let mut idx = end;
    for _ in 0..n {
        if idx == 0 {
            break;
        }
        idx -= 1;
        while !s.is_char_boundary(idx) {
            idx -= 1;
        }
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: usize = 1000;
    const OVERLAP: usize = 100;

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("The capital of Laurania is Fendale.", WINDOW, OVERLAP);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "The capital of Laurania is Fendale.");
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("", WINDOW, OVERLAP).is_empty());
        assert!(chunk_text("   \n\n  ", WINDOW, OVERLAP).is_empty());
    }

    #[test]
    fn boundary_length_single_chunk() {
        let text = "a".repeat(WINDOW);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn windows_never_exceed_limit() {
        let text = "lorem ipsum dolor sit amet consectetur ".repeat(200);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let chars = chunk.chars().count();
            assert!(chars <= WINDOW, "chunk of {} chars", chars);
        }
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        // No spaces or sentence breaks, so every cut is a hard cut and the
        // overlap region is exact.
        let text = "x".repeat(5000);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        for pair in chunks.windows(2) {
            let prev_tail = &pair[0][pair[0].len() - OVERLAP..];
            let next_head = &pair[1][..OVERLAP];
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn overlap_holds_at_word_boundaries() {
        let text = "word ".repeat(1500);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_tail = &pair[0][pair[0].len() - OVERLAP..];
            assert!(pair[1].starts_with(prev_tail));
        }
    }

    #[test]
    fn chunk_count_tracks_window_stride() {
        // ceil((L - overlap) / (window - overlap)) for hard cuts.
        let len = 9100;
        let text = "y".repeat(len);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        let expected = (len - OVERLAP).div_ceil(WINDOW - OVERLAP);
        assert_eq!(chunks.len(), expected);
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let mut text = "p".repeat(800);
        text.push_str("\n\n");
        text.push_str(&"q".repeat(800));
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        assert!(chunks[0].ends_with("\n\n"));
    }

    #[test]
    fn windows_and_overlap_are_counted_in_chars() {
        // Two-byte characters: byte-based windows would halve the
        // effective window and misalign the overlap.
        let text = "é".repeat(3000);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        assert!(chunks.len() > 1);

        assert_eq!(chunks[0].chars().count(), WINDOW);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - OVERLAP..].iter().collect();
            let head: String = pair[1].chars().take(OVERLAP).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "déjà vu — ação über ".repeat(200);
        let chunks = chunk_text(&text, WINDOW, OVERLAP);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= WINDOW);
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }
}

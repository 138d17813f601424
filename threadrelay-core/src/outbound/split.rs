//! Chat-size message splitting.
//!
//! Lengths are counted in characters, the unit chat platforms limit on.

/// Split `text` into chunks of at most `max_len` characters.
///
/// Each cut prefers the last newline inside the limit, then the last space,
/// then a hard cut. A newline or space is only used when it lies in the
/// second half of the window so chunks never get tiny. Newlines at the start
/// of the following chunk are dropped.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let half = max_len / 2;
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        // Byte offset of the first character past the limit
        let limit = match rest.char_indices().nth(max_len) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(rest.to_string());
                break;
            }
        };
        let window = &rest[..limit];

        let cut = find_break(window, '\n', half)
            .or_else(|| find_break(window, ' ', half))
            .unwrap_or(limit);

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }

    chunks
}

/// Byte offset of the last `sep` in `window`, if it sits at or past `min_chars`.
///
/// Never 0, so every cut makes progress.
fn find_break(window: &str, sep: char, min_chars: usize) -> Option<usize> {
    let idx = window.rfind(sep)?;
    (idx > 0 && window[..idx].chars().count() >= min_chars).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_untouched() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert_eq!(split_message("", 10), vec![""]);
    }

    #[test]
    fn test_prefers_newline() {
        let text = "aaaaaaa\nbbbb cccccc";
        let chunks = split_message(text, 10);
        assert_eq!(chunks[0], "aaaaaaa");
        assert_eq!(chunks[1], "bbbb cccccc".chars().take(10).collect::<String>());
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_falls_back_to_space() {
        let chunks = split_message("aaaaaaa bbbbbbb", 10);
        assert_eq!(chunks, vec!["aaaaaaa", " bbbbbbb"]);
    }

    #[test]
    fn test_ignores_early_separator() {
        // Newline in the first half of the window is not used
        let chunks = split_message("ab\ncdefghijklmnop", 10);
        assert_eq!(chunks[0], "ab\ncdefghi");
        assert_eq!(chunks[1], "jklmnop");
    }

    #[test]
    fn test_hard_cut_counts_chars_not_bytes() {
        let text = "é".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_separator_at_chunk_start_still_advances() {
        assert_eq!(split_message(" ab", 1), vec![" ", "a", "b"]);
        assert_eq!(split_message("a\n\nb", 1), vec!["a", "b"]);
    }

    #[test]
    fn test_drops_leading_newlines_of_next_chunk() {
        let text = format!("{}\n\n\n{}", "a".repeat(8), "b".repeat(5));
        let chunks = split_message(&text, 9);
        assert_eq!(chunks, vec!["a".repeat(8), "b".repeat(5)]);
    }
}

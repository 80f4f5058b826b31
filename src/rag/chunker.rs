//! Word-window chunking of abstracts.

/// Splits `text` into consecutive, non-overlapping windows of at most
/// `max_words` whitespace-delimited words. Every word is kept, in order;
/// only the last window may be shorter. A `max_words` of zero is treated as one.
pub fn chunk_text(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(max_words)
        .map(|window| window.join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_splitting() {
        assert_eq!(chunk_text("a b c d e", 2), vec!["a b", "c d", "e"]);
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(chunk_text("", 180).is_empty());
        assert!(chunk_text("   \n\t ", 180).is_empty());
    }

    #[test]
    fn keeps_every_word_in_order() {
        let text = (0..437).map(|i| format!("w{}", i)).collect::<Vec<_>>().join("  ");
        let chunks = chunk_text(&text, 180);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.split_whitespace().count() <= 180));
        assert_eq!(chunks[2].split_whitespace().count(), 77);

        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.split_whitespace().map(str::to_string))
            .collect();
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(
            chunk_text("Attention is all you need", 180),
            vec!["Attention is all you need"]
        );
    }
}

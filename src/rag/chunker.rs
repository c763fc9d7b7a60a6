//! Recursive character text splitter.
//!
//! Text is split on the coarsest separator present, pieces that are still too
//! long are split again with the next separator, and adjacent pieces are merged
//! back into chunks of at most `chunk_size` characters with `chunk_overlap`
//! characters carried into the following chunk.

use crate::core::config::settings::ChunkingConfig;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }
            if !short_pieces.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut short_pieces)));
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(short_pieces));
        }
        chunks
    }

    /// Greedily packs pieces into chunks, keeping a trailing window of at most
    /// `chunk_overlap` characters as the start of the next chunk.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let (_, dropped) = current.remove(0);
                    total -= dropped;
                }
            }
            total += len;
            current.push((piece, len));
        }
        push_joined(&mut chunks, &current);
        chunks
    }
}

fn pick_separator<'a, 'b>(text: &str, separators: &'b [&'a str]) -> (&'a str, &'b [&'a str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Splits on `separator`, leaving each separator at the start of the piece
/// that follows it. Empty pieces are dropped.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}

fn push_joined(chunks: &mut Vec<String>, current: &[(String, usize)]) {
    let joined: String = current.iter().map(|(piece, _)| piece.as_str()).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(500, 100);

        let chunks = chunker.split("  How do I reset my password?  ");

        assert_eq!(chunks, vec!["How do I reset my password?".to_string()]);
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(500, 100);

        assert!(chunker.split("").is_empty());
        assert!(chunker.split(" \n\n \n ").is_empty());
    }

    #[test]
    fn chunks_respect_the_size_limit() {
        let chunker = RecursiveChunker::new(50, 10);
        let text = numbered_words(200);

        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let chunker = RecursiveChunker::new(50, 10);
        let text = numbered_words(200);

        let chunks = chunker.split(&text);

        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert_eq!(last_word, first_word);
        }
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let chunker = RecursiveChunker::new(40, 0);
        let text = "First paragraph is here.\n\nSecond paragraph follows.";

        let chunks = chunker.split(text);

        assert_eq!(
            chunks,
            vec![
                "First paragraph is here.".to_string(),
                "Second paragraph follows.".to_string()
            ]
        );
    }

    #[test]
    fn separator_stays_with_the_following_piece() {
        assert_eq!(
            split_keeping_separator("a.b.c", "."),
            vec!["a".to_string(), ".b".to_string(), ".c".to_string()]
        );
        assert_eq!(
            split_keeping_separator(".lead", "."),
            vec![".lead".to_string()]
        );
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let chunker = RecursiveChunker::new(10, 2);
        let text = "abcdefghijklmnopqrstuvwxyz";

        let chunks = chunker.split(text);

        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks[0].starts_with("abcdefghij"));
        let rebuilt: String = chunks.concat();
        assert!(rebuilt.contains('z'));
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let chunker = RecursiveChunker::new(6, 0);
        let text = "ééééé ééééé";

        let chunks = chunker.split(text);

        assert_eq!(chunks, vec!["ééééé".to_string(), "ééééé".to_string()]);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunker = RecursiveChunker::new(10, 50);

        let chunks = chunker.split("one two three four five six seven eight nine ten");

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 10));
        assert!(chunks.last().unwrap().ends_with("ten"));
    }
}

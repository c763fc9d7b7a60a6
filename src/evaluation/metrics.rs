//! Reference-free lexical metrics over lowercase whitespace tokens.

use std::collections::HashSet;

use super::types::HeuristicMetrics;

const QUESTION_WORDS: [&str; 8] = ["what", "when", "where", "who", "why", "how", "which", "whose"];

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn answer_length_ratio(query: &str, answer: &str) -> f64 {
    let query_len = query.chars().count();
    if query_len == 0 {
        return 0.0;
    }
    answer.chars().count() as f64 / query_len as f64
}

/// Share of distinct context words that also appear in the answer.
pub fn context_coverage(answer: &str, chunks: &[String]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    let context_words = word_set(&chunks.join(" "));
    if context_words.is_empty() {
        return 0.0;
    }
    let answer_words = word_set(answer);
    answer_words.intersection(&context_words).count() as f64 / context_words.len() as f64
}

/// One minus the mean pairwise Jaccard similarity between chunks.
pub fn context_diversity(chunks: &[String]) -> f64 {
    if chunks.len() < 2 {
        return 1.0;
    }
    let sets: Vec<HashSet<String>> = chunks.iter().map(|chunk| word_set(chunk)).collect();

    let mut similarities = Vec::new();
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            if sets[i].is_empty() || sets[j].is_empty() {
                continue;
            }
            similarities.push(jaccard(&sets[i], &sets[j]));
        }
    }

    if similarities.is_empty() {
        return 1.0;
    }
    1.0 - similarities.iter().sum::<f64>() / similarities.len() as f64
}

pub fn query_answer_similarity(query: &str, answer: &str) -> f64 {
    let query_words = word_set(query);
    let answer_words = word_set(answer);
    if query_words.is_empty() || answer_words.is_empty() {
        return 0.0;
    }
    jaccard(&query_words, &answer_words)
}

/// 1.0 for a substantive answer, 0.5 otherwise. Questions need a longer answer.
pub fn answer_completeness(query: &str, answer: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let is_question = QUESTION_WORDS.iter().any(|word| query_lower.contains(word));
    let min_len = if is_question { 10 } else { 5 };
    if answer.trim().chars().count() > min_len {
        1.0
    } else {
        0.5
    }
}

pub fn heuristic_metrics(query: &str, answer: &str, chunks: &[String]) -> HeuristicMetrics {
    HeuristicMetrics {
        answer_length_ratio: answer_length_ratio(query, answer),
        context_coverage: context_coverage(answer, chunks),
        context_diversity: context_diversity(chunks),
        query_answer_similarity: query_answer_similarity(query, answer),
        answer_completeness: answer_completeness(query, answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn length_ratio_counts_characters() {
        assert_eq!(answer_length_ratio("abcd", "abcdefgh"), 2.0);
        assert_eq!(answer_length_ratio("", "anything"), 0.0);
        assert_eq!(answer_length_ratio("ab", "éé"), 1.0);
    }

    #[test]
    fn coverage_is_share_of_context_words() {
        let context = chunks(&["refunds take five days", "Refunds are free"]);

        // context words: refunds take five days are free
        let score = context_coverage("Refunds take five business days", &context);

        assert!((score - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(context_coverage("anything", &[]), 0.0);
    }

    #[test]
    fn diversity_of_identical_chunks_is_zero() {
        let context = chunks(&["same words here", "same words here"]);

        assert!((context_diversity(&context) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn diversity_defaults_to_one() {
        assert_eq!(context_diversity(&chunks(&["only one"])), 1.0);
        assert_eq!(context_diversity(&chunks(&["", "  "])), 1.0);
        assert_eq!(context_diversity(&chunks(&["alpha", "beta"])), 1.0);
    }

    #[test]
    fn similarity_is_jaccard_of_word_sets() {
        let score = query_answer_similarity("reset my password", "Reset the password");

        // {reset, password} / {reset, my, password, the}
        assert!((score - 0.5).abs() < 1e-12);
        assert_eq!(query_answer_similarity("", "answer"), 0.0);
    }

    #[test]
    fn completeness_depends_on_question_words() {
        assert_eq!(answer_completeness("How do I log in?", "Use SSO."), 0.5);
        assert_eq!(answer_completeness("How do I log in?", "Use the SSO button."), 1.0);
        assert_eq!(answer_completeness("Reset password", "Done!!"), 1.0);
        assert_eq!(answer_completeness("Reset password", "  ok  "), 0.5);
        // substring match, as in "somewhere"
        assert_eq!(answer_completeness("somewhere", "short one"), 0.5);
    }

    #[test]
    fn bounded_metrics_stay_in_unit_interval() {
        let context = chunks(&["a b c", "c d e", "x"]);
        let metrics = heuristic_metrics("what is c", "c is a letter", &context);

        for value in [
            metrics.context_coverage,
            metrics.context_diversity,
            metrics.query_answer_similarity,
            metrics.answer_completeness,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(metrics.answer_length_ratio >= 0.0);
    }
}

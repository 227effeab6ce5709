// src/bot/profanity.rs - Substring profanity matcher

use crate::types::MatchResult;

/// Find every word of `word_list` contained in `text`.
///
/// Matching is a plain substring search with no word-boundary check, so a
/// listed fragment matches inside longer words. When `case_sensitive` is
/// false both sides are lowercased first, and matched words are reported in
/// their lowercased form.
pub fn find_profanity(text: &str, word_list: &[String], case_sensitive: bool) -> MatchResult {
    let haystack = if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    };

    let matched_words: Vec<String> = word_list
        .iter()
        .map(|word| {
            if case_sensitive {
                word.clone()
            } else {
                word.to_lowercase()
            }
        })
        .filter(|word| haystack.contains(word.as_str()))
        .collect();

    MatchResult {
        found: !matched_words.is_empty(),
        matched_words,
    }
}

// Text Processing Service
// Normalization, tokenization and n-gram derivation shared by the scorers

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Closed set of English function words dropped when stopword removal is requested.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "may", "might", "must", "can",
];

/// Sentences at or below this many chars are dropped by `tokenize_sentences`.
const MIN_SENTENCE_CHARS: usize = 10;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+@\S+").expect("email regex"))
}

fn special_char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.,!?;:\-']").expect("special char regex"))
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("non-word regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("sentence end regex"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Normalize text for similarity comparison.
///
/// Lowercases, strips URLs and email addresses, replaces anything outside word
/// characters and `. , ! ? ; : - '` with a space and collapses whitespace.
/// Stopword removal can distort semantic scoring, so it is off by default.
pub fn normalize(text: &str, remove_stopwords: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lower = text.to_lowercase();
    let s = url_re().replace_all(&lower, "");
    let s = email_re().replace_all(&s, "");
    let s = special_char_re().replace_all(&s, " ");
    let s = whitespace_re().replace_all(&s, " ");

    if remove_stopwords {
        let stop = stop_words();
        return s
            .split_whitespace()
            .filter(|w| !stop.contains(w))
            .collect::<Vec<_>>()
            .join(" ");
    }

    s.trim().to_string()
}

/// Split on runs of `.`, `!` or `?` and keep trimmed, non-empty pieces.
pub fn split_sentences_raw(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    sentence_end_re()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sentence tokenization for fragment-level analysis; near-empty pieces are dropped.
pub fn tokenize_sentences(text: &str) -> Vec<String> {
    split_sentences_raw(text)
        .into_iter()
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .collect()
}

pub fn tokenize_words(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    non_word_re()
        .replace_all(text, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Character n-grams over the lowercased text with all whitespace removed.
/// Text shorter than `n` yields itself as the only gram.
pub fn character_ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if chars.is_empty() || n == 0 {
        return vec![];
    }
    if chars.len() < n {
        return vec![chars.into_iter().collect()];
    }

    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Word n-grams joined by a single space. Fewer than `n` words yields one joined gram.
pub fn word_ngrams(text: &str, n: usize) -> Vec<String> {
    let words = tokenize_words(text);
    if words.is_empty() || n == 0 {
        return vec![];
    }
    if words.len() < n {
        return vec![words.join(" ")];
    }

    words.windows(n).map(|w| w.join(" ")).collect()
}

/// Keep at most `max_tokens` whitespace-delimited tokens, preserving the original spacing.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> &str {
    if max_tokens == 0 {
        return "";
    }

    let mut seen = 0usize;
    let mut in_token = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_token {
                seen += 1;
                if seen == max_tokens {
                    return &text[..idx];
                }
            }
            in_token = false;
        } else {
            in_token = true;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_urls_emails_and_symbols() {
        let input = "Machine Learning is AMAZING! Check out https://example.com for more.\n\
                     Contact: test@email.com\n   Multiple    spaces (and #tags).";
        let output = normalize(input, false);
        assert_eq!(
            output,
            "machine learning is amazing! check out for more. contact: multiple spaces and tags ."
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Hello, World!  Visit http://a.b/c?d=e or mail x@y.z",
            "Tabs\tand\nnewlines — em dash “quotes” 'single' (parens) [brackets]",
            "   ",
            "Ünïcödé TEXT with ß and İ",
        ];
        for s in samples {
            let once = normalize(s, false);
            assert_eq!(normalize(&once, false), once, "input: {s:?}");
            let once_stop = normalize(s, true);
            assert_eq!(normalize(&once_stop, true), once_stop, "input: {s:?}");
        }
    }

    #[test]
    fn test_normalize_removes_stopwords_when_requested() {
        let output = normalize("The cat is on the mat and it sleeps", true);
        assert_eq!(output, "cat mat it sleeps");
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(normalize("", false), "");
        assert!(tokenize_sentences("").is_empty());
        assert!(tokenize_words("").is_empty());
        assert!(character_ngrams("", 3).is_empty());
        assert!(word_ngrams("", 3).is_empty());
    }

    #[test]
    fn test_tokenize_sentences_drops_short_pieces() {
        let text = "This is the first sentence. Short! Is this the third one?? Yes.";
        let sentences = tokenize_sentences(text);
        assert_eq!(
            sentences,
            vec!["This is the first sentence", "Is this the third one"]
        );
        assert_eq!(split_sentences_raw(text).len(), 4);
    }

    #[test]
    fn test_character_ngrams() {
        assert_eq!(character_ngrams("Ab cd", 3), vec!["abc", "bcd"]);
        assert_eq!(character_ngrams("ab", 3), vec!["ab"]);
    }

    #[test]
    fn test_word_ngrams() {
        let grams = word_ngrams("one two, three four", 3);
        assert_eq!(grams, vec!["one two three", "two three four"]);
        assert_eq!(word_ngrams("just two", 5), vec!["just two"]);
    }

    #[test]
    fn test_truncate_tokens() {
        assert_eq!(truncate_tokens("a b  c d", 2), "a b");
        assert_eq!(truncate_tokens("a b", 5), "a b");
        assert_eq!(truncate_tokens("a b", 0), "");
    }
}

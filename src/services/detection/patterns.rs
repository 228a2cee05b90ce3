// Phrase Patterns
// Stock phrasing typical of machine-written prose, counted per 100 words

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Hedging,
    FormalTransitions,
    AiPhrases,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 3] = [
        PatternCategory::Hedging,
        PatternCategory::FormalTransitions,
        PatternCategory::AiPhrases,
    ];

    fn sources(&self) -> &'static [&'static str] {
        match self {
            Self::Hedging => &[
                r"\b(however|moreover|furthermore|nevertheless|nonetheless)\b",
                r"\b(it is important to note|it should be noted|it is worth noting)\b",
                r"\b(in conclusion|to summarize|in summary)\b",
            ],
            Self::FormalTransitions => &[
                r"\b(firstly|secondly|thirdly|finally)\b",
                r"\b(on the one hand|on the other hand)\b",
                r"\b(in addition|additionally|furthermore)\b",
            ],
            Self::AiPhrases => &[
                r"\b(as an AI|I am an AI|as a language model)\b",
                r"\b(I don't have personal|I cannot provide personal)\b",
                r"\b(it's important to|it is crucial to)\b",
                r"\b(delve into|dive into|explore the nuances)\b",
            ],
        }
    }

    fn regexes(&self) -> &'static [Regex] {
        static HEDGING: OnceLock<Vec<Regex>> = OnceLock::new();
        static TRANSITIONS: OnceLock<Vec<Regex>> = OnceLock::new();
        static AI_PHRASES: OnceLock<Vec<Regex>> = OnceLock::new();
        let cell = match self {
            Self::Hedging => &HEDGING,
            Self::FormalTransitions => &TRANSITIONS,
            Self::AiPhrases => &AI_PHRASES,
        };
        cell.get_or_init(|| {
            self.sources()
                .iter()
                .map(|src| Regex::new(&format!("(?i){}", src)).expect("ai pattern regex"))
                .collect()
        })
    }
}

/// Matches per 100 whitespace-delimited words for one category, capped at 1.0.
pub fn category_score(text: &str, category: PatternCategory) -> f64 {
    let word_count = text.split_whitespace().count();
    if word_count == 0 {
        return 0.0;
    }
    let matches: usize = category
        .regexes()
        .iter()
        .map(|re| re.find_iter(text).count())
        .sum();
    (matches as f64 / word_count as f64 * 100.0).min(1.0)
}

/// Mean of the three capped category scores.
pub fn pattern_density(text: &str) -> f64 {
    let total: f64 = PatternCategory::ALL
        .iter()
        .map(|c| category_score(text, *c))
        .sum();
    total / PatternCategory::ALL.len() as f64
}

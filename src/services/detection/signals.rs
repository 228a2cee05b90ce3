// Statistical Signals
// Perplexity proxy, burstiness and vocabulary diversity computed from raw text

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::services::text_processor::split_sentences_raw;

/// Upper bound of the perplexity proxy and its value for texts too short to measure.
/// Unigram perplexity is a stand-in for model perplexity; the range is a calibration
/// constant rather than a property of the text.
pub const PERPLEXITY_CEILING: f64 = 100.0;
const MIN_PERPLEXITY_CHARS: usize = 10;
const MIN_PERPLEXITY_WORDS: usize = 5;
const MIN_BURSTINESS_SENTENCES: usize = 3;
const MIN_DIVERSITY_WORDS: usize = 10;
const NEUTRAL: f64 = 0.5;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("word regex"))
}

fn lowercase_words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_re().find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// 2^H of the word-frequency distribution, clamped to [0, ceiling].
pub fn perplexity_proxy(text: &str, ceiling: f64) -> f64 {
    if text.trim().chars().count() < MIN_PERPLEXITY_CHARS {
        return ceiling;
    }
    let words = lowercase_words(text);
    if words.len() < MIN_PERPLEXITY_WORDS {
        return ceiling;
    }

    let mut freq: HashMap<&str, usize> = HashMap::new();
    for w in &words {
        *freq.entry(w.as_str()).or_insert(0) += 1;
    }

    let total = words.len() as f64;
    let entropy = -freq
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            p * p.log2()
        })
        .sum::<f64>();

    2f64.powf(entropy).clamp(0.0, ceiling)
}

/// Variation in sentence length rescaled to [0, 1]. Low values mean uniform
/// sentences. Fewer than three sentences is neutral.
pub fn burstiness(text: &str) -> f64 {
    let sentences = split_sentences_raw(text);
    if sentences.len() < MIN_BURSTINESS_SENTENCES {
        return NEUTRAL;
    }

    let lengths: Vec<f64> = sentences
        .iter()
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return NEUTRAL;
    }
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;

    let b = (variance - mean) / (variance + mean);
    ((b + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Type-token ratio over lowercase words; neutral below ten words.
pub fn vocabulary_diversity(text: &str) -> f64 {
    let words = lowercase_words(text);
    if words.len() < MIN_DIVERSITY_WORDS {
        return NEUTRAL;
    }
    let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
    unique.len() as f64 / words.len() as f64
}

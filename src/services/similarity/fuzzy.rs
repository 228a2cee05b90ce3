// Fuzzy Similarity
// Edit-distance scorer: best-aligning substring ratio blended with a token-sorted ratio.

use crate::models::ScoreOutcome;
use strsim::normalized_levenshtein;

const PARTIAL_WEIGHT: f64 = 0.6;
const TOKEN_SORT_WEIGHT: f64 = 0.4;

/// Above this many candidate windows, partial alignment switches to a coarse scan
/// followed by a halving refinement around the best coarse window.
const MAX_COARSE_WINDOWS: usize = 48;

/// Normalized edit similarity in [0, 1].
pub fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Best ratio between the shorter string and any equally long window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return 0.0;
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let needle: String = short.iter().collect();
    let window_len = short.len();
    let last_start = long.len() - window_len;
    let score_at = |start: usize| -> f64 {
        let window: String = long[start..start + window_len].iter().collect();
        ratio(&needle, &window)
    };

    let window_count = last_start + 1;
    if window_count <= MAX_COARSE_WINDOWS {
        return (0..=last_start).map(&score_at).fold(0.0, f64::max);
    }

    let stride = window_count.div_ceil(MAX_COARSE_WINDOWS);
    let mut best_start = 0;
    let mut best = score_at(0);
    let mut start = stride;
    while start <= last_start {
        let s = score_at(start);
        if s > best {
            best = s;
            best_start = start;
        }
        start += stride;
    }
    let tail = score_at(last_start);
    if tail > best {
        best = tail;
        best_start = last_start;
    }

    let mut step = stride / 2;
    while step > 0 {
        let left = best_start.saturating_sub(step);
        let right = (best_start + step).min(last_start);
        for candidate in [left, right] {
            let s = score_at(candidate);
            if s > best {
                best = s;
                best_start = candidate;
            }
        }
        step /= 2;
    }

    best
}

/// Ratio after sorting whitespace-separated tokens, ignoring word order.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sorted = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    ratio(&sorted(a), &sorted(b))
}

/// Fuzzy scorer: 0.6 * partial alignment + 0.4 * token-sorted ratio.
pub fn fuzzy_similarity(text1: &str, text2: &str) -> ScoreOutcome {
    if text1.trim().is_empty() || text2.trim().is_empty() {
        return ScoreOutcome::Computed(0.0);
    }

    let score = partial_ratio(text1, text2) * PARTIAL_WEIGHT
        + token_sort_ratio(text1, text2) * TOKEN_SORT_WEIGHT;
    ScoreOutcome::Computed(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ratio_finds_embedded_substring() {
        let needle = "artificial intelligence";
        let hay = "machine learning is a subset of artificial intelligence research";
        assert!((partial_ratio(needle, hay) - 1.0).abs() < 1e-12);
        assert!((partial_ratio(hay, needle) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_ratio_long_inputs_use_refinement() {
        let needle = "the quick brown fox jumps over the lazy dog";
        let hay = format!("{}{}{}", "x".repeat(400), needle, "y".repeat(400));
        assert!((partial_ratio(needle, &hay) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_token_sort_ratio_ignores_order() {
        assert!((token_sort_ratio("fox brown quick", "quick brown fox") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuzzy_similarity_bounds_and_empty() {
        assert_eq!(fuzzy_similarity("", "abc").value(), 0.0);
        let s = fuzzy_similarity("climate change is real", "quantum bits are fragile");
        assert!((0.0..=1.0).contains(&s.value()));
        let same = fuzzy_similarity("identical text here", "identical text here");
        assert!((same.value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuzzy_similarity_near_symmetric() {
        let a = "supervised learning trains models on labeled data";
        let b = "models are trained on labelled data in supervised learning";
        let ab = fuzzy_similarity(a, b).value();
        let ba = fuzzy_similarity(b, a).value();
        assert!((ab - ba).abs() < 0.05);
    }
}

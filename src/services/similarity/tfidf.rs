// TF-IDF Vectorizer
// Two-document vector space used by the character and lexical scorers.
//
// Terms come from the normalizer's n-gram helpers. Semantics: raw term counts,
// smoothed idf ln((1+n)/(1+df)) + 1, L2-normalized rows.
// When the vocabulary exceeds `max_features`, the most frequent terms across the
// fitted documents are kept, ties broken lexicographically.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::services::text_processor::{character_ngrams, tokenize_words, word_ngrams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Character n-grams over the lowercased text with whitespace removed.
    Char { min_n: usize, max_n: usize },
    /// Word n-grams over `\w+` tokens.
    Word { min_n: usize, max_n: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorizeError {
    #[error("empty vocabulary; documents produced no terms")]
    EmptyVocabulary,
}

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    analyzer: Analyzer,
    max_features: usize,
}

impl TfidfVectorizer {
    pub fn new(analyzer: Analyzer, max_features: usize) -> Self {
        Self {
            analyzer,
            max_features,
        }
    }

    /// Character 3..=5-grams capped at 5000 features.
    pub fn character() -> Self {
        Self::new(Analyzer::Char { min_n: 3, max_n: 5 }, 5000)
    }

    /// Word 1..=3-grams capped at 3000 features.
    pub fn lexical() -> Self {
        Self::new(Analyzer::Word { min_n: 1, max_n: 3 }, 3000)
    }

    // Orders longer than the document are skipped rather than padded with the
    // helpers' whole-text gram.
    fn analyze(&self, doc: &str) -> Vec<String> {
        let lower = doc.to_lowercase();
        let (min_n, max_n, len) = match self.analyzer {
            Analyzer::Char { min_n, max_n } => {
                (min_n, max_n, lower.chars().filter(|c| !c.is_whitespace()).count())
            }
            Analyzer::Word { min_n, max_n } => (min_n, max_n, tokenize_words(&lower).len()),
        };

        let mut grams = Vec::new();
        for n in min_n.max(1)..=max_n {
            if len < n {
                break;
            }
            match self.analyzer {
                Analyzer::Char { .. } => grams.extend(character_ngrams(&lower, n)),
                Analyzer::Word { .. } => grams.extend(word_ngrams(&lower, n)),
            }
        }
        grams
    }

    /// Fit on `docs` and return one L2-normalized dense row per document.
    pub fn fit_transform(&self, docs: &[&str]) -> Result<Vec<Vec<f64>>, VectorizeError> {
        let counts: Vec<HashMap<String, usize>> = docs
            .iter()
            .map(|doc| {
                let mut tf: HashMap<String, usize> = HashMap::new();
                for gram in self.analyze(doc) {
                    *tf.entry(gram).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        // Sorted map gives the lexicographic tie-break for free.
        let mut totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for tf in &counts {
            for (term, &c) in tf {
                let entry = totals.entry(term.as_str()).or_insert((0, 0));
                entry.0 += c;
                entry.1 += 1;
            }
        }
        if totals.is_empty() {
            return Err(VectorizeError::EmptyVocabulary);
        }

        let mut ranked: Vec<(&str, usize, usize)> =
            totals.into_iter().map(|(t, (freq, df))| (t, freq, df)).collect();
        if ranked.len() > self.max_features {
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            ranked.truncate(self.max_features);
            ranked.sort_by(|a, b| a.0.cmp(b.0));
        }

        let n_docs = docs.len() as f64;
        let vocab: HashMap<&str, (usize, f64)> = ranked
            .iter()
            .enumerate()
            .map(|(idx, (term, _, df))| {
                let idf = ((1.0 + n_docs) / (1.0 + *df as f64)).ln() + 1.0;
                (*term, (idx, idf))
            })
            .collect();

        let rows = counts
            .iter()
            .map(|tf| {
                let mut row = vec![0.0; vocab.len()];
                for (term, &c) in tf {
                    if let Some(&(idx, idf)) = vocab.get(term.as_str()) {
                        row[idx] = c as f64 * idf;
                    }
                }
                let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|v| *v /= norm);
                }
                row
            })
            .collect();

        Ok(rows)
    }

    /// Fit on the pair and return their cosine similarity in [0, 1].
    pub fn pair_similarity(&self, text1: &str, text2: &str) -> Result<f64, VectorizeError> {
        let rows = self.fit_transform(&[text1, text2])?;
        Ok(cosine(&rows[0], &rows[1]))
    }
}

/// Cosine similarity clamped to [0, 1]. Zero vectors score 0.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}

// Similarity Module
// Character, fuzzy, lexical and semantic scorers plus fragment matching

pub mod engine;
pub mod fragments;
pub mod fuzzy;
pub mod semantic;
pub mod tfidf;

pub use engine::{SimilarityEngine, SimilarityError};
pub use fragments::FragmentMatcher;

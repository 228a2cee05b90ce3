// Confidence Buckets
// Maps an AI probability to one of five ordinal confidence levels.

use crate::models::ConfidenceLevel;

impl ConfidenceLevel {
    /// Boundary values belong to the higher bucket.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.80 {
            Self::VeryHigh
        } else if probability >= 0.60 {
            Self::High
        } else if probability >= 0.40 {
            Self::Medium
        } else if probability >= 0.20 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

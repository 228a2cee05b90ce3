// plagcheck Data Models
// Shared request/response and score types

use serde::{Deserialize, Serialize};
use std::fmt;

// ============ Similarity Scores ============

/// Per-algorithm similarity values, all in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreVector {
    pub character: f64,
    pub fuzzy: f64,
    pub lexical: f64,
    pub semantic: f64,
}

impl ScoreVector {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn values(&self) -> [f64; 4] {
        [self.character, self.fuzzy, self.lexical, self.semantic]
    }

    pub fn min(&self) -> f64 {
        self.values().into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Round every component to 3 decimals for display.
    pub fn rounded(&self) -> Self {
        Self {
            character: round3(self.character),
            fuzzy: round3(self.fuzzy),
            lexical: round3(self.lexical),
            semantic: round3(self.semantic),
        }
    }
}

/// Outcome of a single scorer. Degraded values are neutral stand-ins
/// produced when the scorer could not run (model missing, inference error).
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Computed(f64),
    Degraded { value: f64, reason: String },
}

impl ScoreOutcome {
    pub fn degraded(value: f64, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Computed(v) => *v,
            Self::Degraded { value, .. } => *value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Computed(_) => None,
            Self::Degraded { reason, .. } => Some(reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDiagnostic {
    pub scorer: String,
    pub reason: String,
}

impl ScoreDiagnostic {
    /// Collect a diagnostic when `outcome` is degraded.
    pub fn collect(scorer: &str, outcome: &ScoreOutcome, into: &mut Vec<ScoreDiagnostic>) {
        if let Some(reason) = outcome.reason() {
            into.push(ScoreDiagnostic {
                scorer: scorer.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombinedScore {
    pub overall: f64,
    pub components: ScoreVector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ScoreDiagnostic>,
}

/// Weights of the similarity combiner. Must be non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityWeights {
    pub character: f64,
    pub fuzzy: f64,
    pub lexical: f64,
    pub semantic: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            character: 0.25,
            fuzzy: 0.25,
            lexical: 0.25,
            semantic: 0.25,
        }
    }
}

// ============ Fragments ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub text: String,
    pub score: f64,
    /// 1-based position of the matched corpus text.
    pub source_index: usize,
    pub matched_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

// ============ AI Detection ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiScoreVector {
    pub perplexity_proxy: f64,
    pub burstiness: f64,
    pub pattern_density: f64,
    pub vocabulary_diversity: f64,
    pub classifier_probability: f64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "very high")]
    VeryHigh,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "very low")]
    VeryLow,
}

impl ConfidenceLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very high",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very low",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High - Likely AI-generated",
            Self::High => "High - Probably AI-generated",
            Self::Medium => "Medium - Possibly AI-generated",
            Self::Low => "Low - Probably human-written",
            Self::VeryLow => "Very Low - Likely human-written",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiResult {
    pub probability: f64,
    pub confidence: ConfidenceLevel,
    pub confidence_description: String,
    pub scores: AiScoreVector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ScoreDiagnostic>,
}

impl AiResult {
    pub fn empty() -> Self {
        Self {
            probability: 0.0,
            confidence: ConfidenceLevel::VeryLow,
            confidence_description: ConfidenceLevel::VeryLow.description().to_string(),
            scores: AiScoreVector::default(),
            diagnostics: Vec::new(),
        }
    }
}

// ============ Corpus ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorpusEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub text: String,
}

impl CorpusEntry {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

// ============ Analysis Request / Result ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub doc_id: String,
    pub title: String,
    pub similarity: f64,
    #[serde(rename = "sourceList")]
    pub sources: Vec<SourceRef>,
    pub processing_time_ms: u64,
    pub fragments: Vec<Fragment>,
    pub explain: ScoreVector,
    pub ai_detection: AiResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Zeroed result carrying an error message.
    pub fn failed(doc_id: String, title: String, error: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            doc_id,
            title,
            similarity: 0.0,
            sources: Vec::new(),
            processing_time_ms,
            fragments: Vec::new(),
            explain: ScoreVector::zero(),
            ai_detection: AiResult::empty(),
            error: Some(error.into()),
        }
    }
}

pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_vector_bounds() {
        let v = ScoreVector {
            character: 0.2,
            fuzzy: 0.9,
            lexical: 0.1,
            semantic: 0.5,
        };
        assert_eq!(v.min(), 0.1);
        assert_eq!(v.max(), 0.9);
    }

    #[test]
    fn test_degraded_outcome_is_distinguishable() {
        let computed = ScoreOutcome::Computed(0.5);
        let degraded = ScoreOutcome::degraded(0.5, "classifier unavailable");
        assert_eq!(computed.value(), degraded.value());
        assert!(!computed.is_degraded());
        assert!(degraded.is_degraded());
        assert_eq!(degraded.reason(), Some("classifier unavailable"));
    }

    #[test]
    fn test_confidence_level_serializes_as_label() {
        let json = serde_json::to_string(&ConfidenceLevel::VeryHigh).unwrap();
        assert_eq!(json, "\"very high\"");
        let parsed: ConfidenceLevel = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, ConfidenceLevel::Low);
    }

    #[test]
    fn test_failed_result_is_zeroed() {
        let result = AnalysisResult::failed("d1".into(), "Doc".into(), "boom", 12);
        assert_eq!(result.similarity, 0.0);
        assert!(result.fragments.is_empty());
        assert_eq!(result.explain, ScoreVector::zero());
        assert_eq!(result.ai_detection.probability, 0.0);
        assert_eq!(result.error.as_deref(), Some("boom"));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("sourceList").is_some());
        assert!(json.get("processingTimeMs").is_some());
    }
}

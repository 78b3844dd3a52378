use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{clamp_score, clamped};

/// A named rubric axis scored 1..10
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDimension {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub is_general: bool,
    /// Score anchor -> what that score means
    pub rubric: BTreeMap<u8, String>,
}

lazy_static! {
    static ref GENERAL_DIMENSIONS: Vec<QualityDimension> = vec![
        QualityDimension::general_dimension(
            "Coverage",
            "Breadth and depth with which the answer addresses every part of the objective",
            [
                "Misses most of the objective",
                "Addresses some aspects with large gaps",
                "Covers the main aspects with minor omissions",
                "Comprehensive coverage of every requirement",
            ],
        ),
        QualityDimension::general_dimension(
            "Insight",
            "Analysis, synthesis and non-obvious conclusions beyond restating sources",
            [
                "Restates sources without analysis",
                "Occasional analysis, mostly descriptive",
                "Clear synthesis with some original conclusions",
                "Deep, well-argued insight that connects sources",
            ],
        ),
        QualityDimension::general_dimension(
            "Instruction-Following",
            "Adherence to the requested format, scope and explicit requirements",
            [
                "Ignores the requested format and scope",
                "Follows some instructions",
                "Follows nearly all instructions",
                "Follows every instruction exactly",
            ],
        ),
        QualityDimension::general_dimension(
            "Clarity",
            "Organisation, readability and precision of the writing",
            [
                "Disorganised and hard to follow",
                "Readable with structural problems",
                "Well organised with minor lapses",
                "Exceptionally clear and well structured",
            ],
        ),
    ];
}

impl QualityDimension {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        weight: f64,
        is_general: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
            is_general,
            rubric: BTreeMap::new(),
        }
    }

    pub fn with_rubric_entry(mut self, score: u8, description: impl Into<String>) -> Self {
        self.rubric.insert(clamp_score(score as i64), description.into());
        self
    }

    /// The four fixed general dimensions, 0.25 each before normalisation
    pub fn general() -> Vec<QualityDimension> {
        GENERAL_DIMENSIONS.clone()
    }

    fn general_dimension(name: &str, description: &str, anchors: [&str; 4]) -> Self {
        let mut dimension = Self::new(name, description, 0.25, true);
        for (score, text) in [1u8, 4, 7, 10].into_iter().zip(anchors) {
            dimension.rubric.insert(score, text.to_string());
        }
        dimension
    }

    /// Rubric rendered one anchor per line for prompts
    pub fn render_rubric(&self) -> String {
        if self.rubric.is_empty() {
            return "1 = very poor, 5 = adequate, 10 = excellent".to_string();
        }
        self.rubric
            .iter()
            .map(|(score, text)| format!("{}: {}", score, text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Score for one dimension. The score is clamped to 1..=10 on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    #[serde(deserialize_with = "clamped::score")]
    score: u8,
    pub reasoning: String,
    pub evidence: Vec<String>,
    pub suggestions: Vec<String>,
}

impl DimensionScore {
    pub fn new(
        dimension: QualityDimension,
        raw_score: i64,
        reasoning: impl Into<String>,
        evidence: Vec<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            dimension,
            score: clamp_score(raw_score),
            reasoning: reasoning.into(),
            evidence,
            suggestions,
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn weighted_score(&self) -> f64 {
        self.score as f64 * self.dimension.weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "QualityRecord")]
pub struct QualityEvaluationResult {
    pub dimension_scores: Vec<DimensionScore>,
    weighted_average_score: f64,
    normalized_score: f64,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvements: Vec<String>,
}

impl QualityEvaluationResult {
    pub fn new(
        dimension_scores: Vec<DimensionScore>,
        summary: impl Into<String>,
        strengths: Vec<String>,
        weaknesses: Vec<String>,
        improvements: Vec<String>,
    ) -> Self {
        let total_weight: f64 = dimension_scores.iter().map(|s| s.dimension.weight).sum();
        let weighted_average_score = if total_weight > 0.0 {
            dimension_scores.iter().map(|s| s.weighted_score()).sum::<f64>() / total_weight
        } else {
            0.0
        };
        Self {
            dimension_scores,
            weighted_average_score,
            normalized_score: weighted_average_score / 10.0 * 100.0,
            summary: summary.into(),
            strengths,
            weaknesses,
            improvements,
        }
    }

    /// Σ weighted score / Σ weight, on the 1..10 scale
    pub fn weighted_average_score(&self) -> f64 {
        self.weighted_average_score
    }

    /// Weighted average rescaled to 0..100
    pub fn normalized_score(&self) -> f64 {
        self.normalized_score
    }

    pub fn total_weight(&self) -> f64 {
        self.dimension_scores.iter().map(|s| s.dimension.weight).sum()
    }

    pub fn mean_score(&self) -> f64 {
        if self.dimension_scores.is_empty() {
            return 0.0;
        }
        self.dimension_scores
            .iter()
            .map(|s| s.score() as f64)
            .sum::<f64>()
            / self.dimension_scores.len() as f64
    }
}

/// Stored shape; derived aggregates are recomputed on load
#[derive(Deserialize)]
struct QualityRecord {
    dimension_scores: Vec<DimensionScore>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

impl From<QualityRecord> for QualityEvaluationResult {
    fn from(record: QualityRecord) -> Self {
        Self::new(
            record.dimension_scores,
            record.summary,
            record.strengths,
            record.weaknesses,
            record.improvements,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_dimensions() {
        let general = QualityDimension::general();
        let names: Vec<_> = general.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Coverage", "Insight", "Instruction-Following", "Clarity"]
        );
        assert!(general.iter().all(|d| d.is_general && d.weight == 0.25));
        assert_eq!(general[0].rubric.len(), 4);
    }

    #[test]
    fn test_score_is_clamped() {
        let dim = QualityDimension::new("Depth", "How deep", 0.5, false);
        assert_eq!(DimensionScore::new(dim.clone(), 14, "", vec![], vec![]).score(), 10);
        assert_eq!(DimensionScore::new(dim.clone(), 0, "", vec![], vec![]).score(), 1);
        assert_eq!(DimensionScore::new(dim, 6, "", vec![], vec![]).weighted_score(), 3.0);
    }

    #[test]
    fn test_clamp_survives_deserialization() {
        let dim = QualityDimension::new("Depth", "How deep", 0.5, false);
        let mut value =
            serde_json::to_value(DimensionScore::new(dim, 6, "ok", vec![], vec![])).unwrap();
        value["score"] = serde_json::json!(42);
        let score: DimensionScore = serde_json::from_value(value).unwrap();
        assert_eq!(score.score(), 10);
    }

    #[test]
    fn test_weighted_and_normalized_scores() {
        let a = QualityDimension::new("A", "", 0.75, true);
        let b = QualityDimension::new("B", "", 0.25, false);
        let result = QualityEvaluationResult::new(
            vec![
                DimensionScore::new(a, 8, "", vec![], vec![]),
                DimensionScore::new(b, 4, "", vec![], vec![]),
            ],
            "",
            vec![],
            vec![],
            vec![],
        );
        assert!((result.weighted_average_score() - 7.0).abs() < 1e-9);
        assert!((result.normalized_score() - 70.0).abs() < 1e-9);
        assert!((result.mean_score() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_result_scores_zero() {
        let result = QualityEvaluationResult::new(vec![], "", vec![], vec![], vec![]);
        assert_eq!(result.weighted_average_score(), 0.0);
        assert_eq!(result.normalized_score(), 0.0);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Difficulty, Domain, EvaluationTask, FactCheckResult, QualityEvaluationResult};

/// The research agent's synthesized answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub markdown: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ResearchOutput {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub task: EvaluationTask,
    pub research_output: ResearchOutput,
    pub quality: QualityEvaluationResult,
    pub fact_check: FactCheckResult,
    /// `quality.normalized_score * quality_weight + fact_check.accuracy * factual_weight`
    pub overall_score: f64,
    pub quality_weight: f64,
    pub factual_weight: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn new(
        task: EvaluationTask,
        research_output: ResearchOutput,
        quality: QualityEvaluationResult,
        fact_check: FactCheckResult,
        (quality_weight, factual_weight): (f64, f64),
        started_at: DateTime<Utc>,
    ) -> Self {
        let overall_score =
            quality.normalized_score() * quality_weight + fact_check.accuracy * factual_weight;
        Self {
            task,
            research_output,
            quality,
            fact_check,
            overall_score,
            quality_weight,
            factual_weight,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Mean, population standard deviation and pass rate of a score sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Fraction of scores at or above the pass threshold, in [0, 1]
    pub pass_rate: f64,
}

impl ScoreStatistics {
    pub fn from_scores(scores: &[f64], pass_threshold: f64) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let passed = scores.iter().filter(|&&s| s >= pass_threshold).count();
        Self {
            count: scores.len(),
            mean,
            std_dev: variance.sqrt(),
            pass_rate: passed as f64 / n,
        }
    }
}

/// A batch input whose research run failed before evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub task_id: String,
    pub objective: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluationResult {
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<BatchFailure>,
    pub statistics: ScoreStatistics,
    pub by_difficulty: BTreeMap<Difficulty, ScoreStatistics>,
    pub by_domain: BTreeMap<Domain, ScoreStatistics>,
    /// True when the batch stopped early on an interrupt
    pub interrupted: bool,
}

impl BatchEvaluationResult {
    pub fn new(
        results: Vec<EvaluationResult>,
        failures: Vec<BatchFailure>,
        pass_threshold: f64,
        interrupted: bool,
    ) -> Self {
        let scores: Vec<f64> = results.iter().map(|r| r.overall_score).collect();

        let mut difficulty_scores: BTreeMap<Difficulty, Vec<f64>> = BTreeMap::new();
        let mut domain_scores: BTreeMap<Domain, Vec<f64>> = BTreeMap::new();
        for result in &results {
            difficulty_scores
                .entry(result.task.difficulty)
                .or_default()
                .push(result.overall_score);
            domain_scores
                .entry(result.task.persona.domain)
                .or_default()
                .push(result.overall_score);
        }

        Self {
            statistics: ScoreStatistics::from_scores(&scores, pass_threshold),
            by_difficulty: difficulty_scores
                .into_iter()
                .map(|(k, v)| (k, ScoreStatistics::from_scores(&v, pass_threshold)))
                .collect(),
            by_domain: domain_scores
                .into_iter()
                .map(|(k, v)| (k, ScoreStatistics::from_scores(&v, pass_threshold)))
                .collect(),
            results,
            failures,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DimensionScore, FactVerificationResult, QualityDimension, StatementType, Verdict, VerifiableStatement};

    fn quality(score: i64) -> QualityEvaluationResult {
        let dim = QualityDimension::new("Coverage", "", 1.0, true);
        QualityEvaluationResult::new(
            vec![DimensionScore::new(dim, score, "", vec![], vec![])],
            "",
            vec![],
            vec![],
            vec![],
        )
    }

    fn facts(correct: usize, incorrect: usize) -> FactCheckResult {
        let mut verifications = Vec::new();
        for i in 0..correct + incorrect {
            let verdict = if i < correct { Verdict::Correct } else { Verdict::Incorrect };
            let s = VerifiableStatement::new(format!("claim {}", i), StatementType::Entity, "", 1.0);
            verifications.push(FactVerificationResult::new(s, verdict, vec![], 1.0, "", None));
        }
        FactCheckResult::from_verifications(verifications)
    }

    fn result(domain: Domain, difficulty: Difficulty, score: i64) -> EvaluationResult {
        let mut task = EvaluationTask::from_objective("q", domain);
        task.difficulty = difficulty;
        EvaluationResult::new(
            task,
            ResearchOutput::new("answer"),
            quality(score),
            facts(1, 1),
            (0.6, 0.4),
            Utc::now(),
        )
    }

    #[test]
    fn test_overall_score_blends_quality_and_accuracy() {
        // quality 80, accuracy 50
        let r = result(Domain::Science, Difficulty::Basic, 8);
        assert!((r.overall_score - (80.0 * 0.6 + 50.0 * 0.4)).abs() < 1e-9);
        assert!(r.duration_secs() >= 0.0);
    }

    #[test]
    fn test_score_statistics() {
        let stats = ScoreStatistics::from_scores(&[60.0, 80.0], 70.0);
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 70.0).abs() < 1e-9);
        assert!((stats.std_dev - 10.0).abs() < 1e-9);
        assert!((stats.pass_rate - 0.5).abs() < 1e-9);
        assert_eq!(ScoreStatistics::from_scores(&[], 70.0), ScoreStatistics::default());
    }

    #[test]
    fn test_batch_groups_by_difficulty_and_domain() {
        let batch = BatchEvaluationResult::new(
            vec![
                result(Domain::Science, Difficulty::Basic, 8),
                result(Domain::Science, Difficulty::Advanced, 10),
                result(Domain::Finance, Difficulty::Advanced, 2),
            ],
            vec![BatchFailure {
                task_id: "t".into(),
                objective: "q".into(),
                reason: "agent crashed".into(),
            }],
            70.0,
            false,
        );
        assert_eq!(batch.statistics.count, 3);
        assert_eq!(batch.by_domain[&Domain::Science].count, 2);
        assert_eq!(batch.by_domain[&Domain::Finance].count, 1);
        assert_eq!(batch.by_difficulty[&Difficulty::Advanced].count, 2);
        assert_eq!(batch.failures.len(), 1);

        let json = serde_json::to_value(&batch).unwrap();
        assert!(json["by_domain"]["science"].is_object());
    }
}

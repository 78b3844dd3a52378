use lazy_static::lazy_static;
use researchloops_llm::{Field, Generable, Schema, StructuredGenerator};
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    DimensionScore, EvaluationPrompts, EvaluationTask, QualityDimension, QualityEvaluationResult,
    ResearchOutput,
};

/// Score substituted when a dimension's grading response cannot be parsed
const DEFAULT_DIMENSION_SCORE: i64 = 5;
const STRENGTH_MIN_SCORE: u8 = 7;
const WEAKNESS_MAX_SCORE: u8 = 5;
const FALLBACK_LIST_LEN: usize = 3;

#[derive(Debug, Deserialize)]
struct RubricAnchor {
    score: i64,
    description: String,
}

#[derive(Debug, Deserialize)]
struct DimensionDraft {
    name: String,
    description: String,
    weight: f64,
    rubric: Vec<RubricAnchor>,
}

#[derive(Debug, Deserialize)]
struct DimensionProposals {
    dimensions: Vec<DimensionDraft>,
}

#[derive(Debug, Deserialize)]
struct DimensionJudgement {
    score: i64,
    reasoning: String,
    evidence: Vec<String>,
    suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverallAssessment {
    summary: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    improvements: Vec<String>,
}

lazy_static! {
    static ref DIMENSION_PROPOSALS: Schema =
        Schema::new("DimensionProposals", "Task-specific grading dimensions").field(Field::objects(
            "dimensions",
            Schema::new("Dimension", "One grading dimension")
                .field(Field::string("name", "Short dimension name"))
                .field(Field::string("description", "What the dimension measures"))
                .field(Field::number("weight", 0.0, 1.0, "Relative importance"))
                .field(Field::objects(
                    "rubric",
                    Schema::new("RubricAnchor", "A rubric anchor")
                        .field(Field::integer("score", 1, 10, "Anchor score"))
                        .field(Field::string("description", "What this score means")),
                    "Anchors for scores 1, 4, 7 and 10",
                )),
            "Proposed dimensions, most important first",
        ));
    static ref DIMENSION_JUDGEMENT: Schema =
        Schema::new("DimensionJudgement", "A grade on one dimension")
            .field(Field::integer("score", 1, 10, "Rubric score"))
            .field(Field::string("reasoning", "Why this score"))
            .field(Field::strings("evidence", "Short quotes from the report"))
            .field(Field::strings("suggestions", "Concrete improvements"));
    static ref OVERALL_ASSESSMENT: Schema =
        Schema::new("OverallAssessment", "Overall quality assessment")
            .field(Field::string("summary", "Two or three sentence summary"))
            .field(Field::strings("strengths", "Main strengths"))
            .field(Field::strings("weaknesses", "Main weaknesses"))
            .field(Field::strings("improvements", "Priority improvements, most important first"));
}

impl Generable for DimensionProposals {
    fn schema() -> &'static Schema {
        &DIMENSION_PROPOSALS
    }
}

impl Generable for DimensionJudgement {
    fn schema() -> &'static Schema {
        &DIMENSION_JUDGEMENT
    }
}

impl Generable for OverallAssessment {
    fn schema() -> &'static Schema {
        &OVERALL_ASSESSMENT
    }
}

/// Rescale weights so general dimensions sum to `general_weight` and
/// task-specific ones to `1 - general_weight`.
///
/// With no task-specific dimensions the general group takes the full weight.
/// A group whose source weights sum to zero shares its target evenly.
pub fn normalize_weights(
    general: &mut [QualityDimension],
    specific: &mut [QualityDimension],
    general_weight: f64,
) {
    let general_weight = general_weight.clamp(0.0, 1.0);
    if specific.is_empty() {
        rescale(general, 1.0);
    } else if general.is_empty() {
        rescale(specific, 1.0);
    } else {
        rescale(general, general_weight);
        rescale(specific, 1.0 - general_weight);
    }
}

fn rescale(group: &mut [QualityDimension], target: f64) {
    if group.is_empty() {
        return;
    }
    let total: f64 = group.iter().map(|d| d.weight.max(0.0)).sum();
    if total <= 0.0 {
        let share = target / group.len() as f64;
        group.iter_mut().for_each(|d| d.weight = share);
    } else {
        group
            .iter_mut()
            .for_each(|d| d.weight = d.weight.max(0.0) / total * target);
    }
}

/// Scores a research answer on the general dimensions plus dimensions
/// generated for the task.
pub struct QualityEvaluator {
    generator: Arc<dyn StructuredGenerator>,
    progress: Option<ProgressCallback>,
}

impl QualityEvaluator {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self {
            generator,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: EvaluationProgress) {
        if let Some(ref progress) = self.progress {
            progress(&event);
        }
    }

    /// Task-specific dimensions; empty when generation fails
    pub async fn generate_dimensions(
        &self,
        task: &EvaluationTask,
        max_dimensions: usize,
    ) -> Vec<QualityDimension> {
        if max_dimensions == 0 {
            return Vec::new();
        }
        let prompt = EvaluationPrompts::build_dimensions_prompt(task, max_dimensions);
        let proposals: DimensionProposals = match self.generator.respond(&prompt).await {
            Ok(p) => p,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Dimension generation failed, using general dimensions only");
                return Vec::new();
            }
        };

        let general_names: Vec<String> = QualityDimension::general()
            .iter()
            .map(|d| d.name.to_lowercase())
            .collect();

        proposals
            .dimensions
            .into_iter()
            .filter(|d| !d.name.trim().is_empty())
            .filter(|d| !general_names.contains(&d.name.trim().to_lowercase()))
            .take(max_dimensions)
            .map(|draft| {
                let mut dimension =
                    QualityDimension::new(draft.name.trim(), draft.description, draft.weight, false);
                for anchor in draft.rubric {
                    dimension = dimension.with_rubric_entry(
                        anchor.score.clamp(1, 10) as u8,
                        anchor.description,
                    );
                }
                dimension
            })
            .collect()
    }

    /// Grade one dimension; a failed response scores 5 with the failure as reasoning
    pub async fn score_dimension(
        &self,
        task: &EvaluationTask,
        output: &ResearchOutput,
        dimension: &QualityDimension,
    ) -> DimensionScore {
        let prompt = EvaluationPrompts::build_score_prompt(task, output, dimension);
        match self.generator.respond::<DimensionJudgement>(&prompt).await {
            Ok(j) => DimensionScore::new(
                dimension.clone(),
                j.score,
                j.reasoning,
                j.evidence,
                j.suggestions,
            ),
            Err(e) => {
                warn!(dimension = %dimension.name, error = %e, "Dimension scoring failed, using default score");
                DimensionScore::new(
                    dimension.clone(),
                    DEFAULT_DIMENSION_SCORE,
                    format!("Default score: the grading response could not be parsed ({})", e),
                    Vec::new(),
                    Vec::new(),
                )
            }
        }
    }

    pub async fn evaluate(
        &self,
        task: &EvaluationTask,
        output: &ResearchOutput,
        general_weight: f64,
        max_task_specific_dimensions: usize,
    ) -> QualityEvaluationResult {
        let mut general = QualityDimension::general();
        let mut specific = self
            .generate_dimensions(task, max_task_specific_dimensions)
            .await;
        normalize_weights(&mut general, &mut specific, general_weight);
        self.emit(EvaluationProgress::DimensionsGenerated {
            general: general.len(),
            task_specific: specific.len(),
        });

        // Sequential to bound concurrent calls on one generator session
        let mut scores = Vec::with_capacity(general.len() + specific.len());
        for dimension in general.iter().chain(specific.iter()) {
            let score = self.score_dimension(task, output, dimension).await;
            self.emit(EvaluationProgress::DimensionScored {
                dimension: dimension.name.clone(),
                score: score.score(),
            });
            scores.push(score);
        }

        let summary_input: Vec<(String, u8, String)> = scores
            .iter()
            .map(|s| (s.dimension.name.clone(), s.score(), s.reasoning.clone()))
            .collect();
        let prompt = EvaluationPrompts::build_assessment_prompt(task, &summary_input);
        let result = match self.generator.respond::<OverallAssessment>(&prompt).await {
            Ok(a) => QualityEvaluationResult::new(
                scores,
                a.summary,
                a.strengths,
                a.weaknesses,
                a.improvements,
            ),
            Err(e) => {
                warn!(error = %e, "Overall assessment failed, synthesising from dimension scores");
                fallback_assessment(scores)
            }
        };

        debug!(
            weighted_average = result.weighted_average_score(),
            normalized = result.normalized_score(),
            "Quality evaluation complete"
        );
        self.emit(EvaluationProgress::QualityCompleted {
            weighted_average: result.weighted_average_score(),
            normalized_score: result.normalized_score(),
        });
        result
    }
}

fn fallback_assessment(scores: Vec<DimensionScore>) -> QualityEvaluationResult {
    let mut by_score_desc: Vec<&DimensionScore> = scores.iter().collect();
    by_score_desc.sort_by(|a, b| b.score().cmp(&a.score()));
    let strengths = by_score_desc
        .iter()
        .filter(|s| s.score() >= STRENGTH_MIN_SCORE)
        .take(FALLBACK_LIST_LEN)
        .map(|s| s.dimension.name.clone())
        .collect();
    let weaknesses = by_score_desc
        .iter()
        .rev()
        .filter(|s| s.score() <= WEAKNESS_MAX_SCORE)
        .take(FALLBACK_LIST_LEN)
        .map(|s| s.dimension.name.clone())
        .collect();
    let improvements = scores
        .iter()
        .flat_map(|s| s.suggestions.iter().cloned())
        .take(FALLBACK_LIST_LEN)
        .collect();

    let mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| s.score() as f64).sum::<f64>() / scores.len() as f64
    };
    let summary = format!(
        "Average dimension score {:.1}/10 across {} dimensions",
        mean,
        scores.len()
    );
    QualityEvaluationResult::new(scores, summary, strengths, weaknesses, improvements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Domain;
    use researchloops_llm::testing::ScriptedGenerator;
    use serde_json::json;

    fn task() -> EvaluationTask {
        EvaluationTask::from_objective("State of solid-state batteries in 2025", Domain::Technology)
    }

    fn output() -> ResearchOutput {
        ResearchOutput::new("# Report\nSolid-state cells reached pilot production.")
    }

    fn total_weight(dims: &[QualityDimension]) -> f64 {
        dims.iter().map(|d| d.weight).sum()
    }

    #[test]
    fn test_normalize_weights_splits_groups() {
        let mut general = QualityDimension::general();
        let mut specific = vec![
            QualityDimension::new("Sourcing", "", 0.5, false),
            QualityDimension::new("Recency", "", 0.5, false),
        ];
        normalize_weights(&mut general, &mut specific, 0.6);
        assert!(general.iter().all(|d| (d.weight - 0.15).abs() < 1e-9));
        assert!(specific.iter().all(|d| (d.weight - 0.2).abs() < 1e-9));
    }

    #[test]
    fn test_normalize_weights_without_specific_dimensions() {
        let mut general = QualityDimension::general();
        normalize_weights(&mut general, &mut [], 0.6);
        assert!((total_weight(&general) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_weights_zero_source_weight() {
        let mut general = QualityDimension::general();
        let mut specific = vec![
            QualityDimension::new("A", "", 0.0, false),
            QualityDimension::new("B", "", 0.0, false),
            QualityDimension::new("C", "", 0.0, false),
            QualityDimension::new("D", "", 0.0, false),
        ];
        normalize_weights(&mut general, &mut specific, 0.6);
        assert!(specific.iter().all(|d| (d.weight - 0.1).abs() < 1e-9));
        assert!((total_weight(&general) + total_weight(&specific) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_weights_unequal_sources_keep_proportion() {
        let mut general = QualityDimension::general();
        let mut specific = vec![
            QualityDimension::new("A", "", 0.9, false),
            QualityDimension::new("B", "", 0.3, false),
        ];
        normalize_weights(&mut general, &mut specific, 0.5);
        assert!((specific[0].weight - 0.375).abs() < 1e-9);
        assert!((specific[1].weight - 0.125).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_generate_dimensions_failure_returns_empty() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push_failure("DimensionProposals", "bad");
        let evaluator = QualityEvaluator::new(scripted.clone());
        assert!(evaluator.generate_dimensions(&task(), 4).await.is_empty());
    }

    #[tokio::test]
    async fn test_generate_dimensions_truncates_and_skips_general_names() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "DimensionProposals",
            json!({"dimensions": [
                {"name": "Clarity", "description": "dup", "weight": 0.5, "rubric": []},
                {"name": "Data Recency", "description": "Uses 2025 data", "weight": 0.6,
                 "rubric": [{"score": 10, "description": "All figures current"}]},
                {"name": "Vendor Coverage", "description": "Names vendors", "weight": 0.4, "rubric": []},
                {"name": "Cost Analysis", "description": "Costs", "weight": 0.2, "rubric": []}
            ]}),
        );
        let evaluator = QualityEvaluator::new(scripted.clone());
        let dims = evaluator.generate_dimensions(&task(), 2).await;
        let names: Vec<_> = dims.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Data Recency", "Vendor Coverage"]);
        assert!(dims.iter().all(|d| !d.is_general));
        assert_eq!(dims[0].rubric[&10], "All figures current");
    }

    #[tokio::test]
    async fn test_score_dimension_clamps_and_defaults() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "DimensionJudgement",
            json!({"score": 14, "reasoning": "great", "evidence": [], "suggestions": []}),
        );
        scripted.push_failure("DimensionJudgement", "unparseable");
        let evaluator = QualityEvaluator::new(scripted.clone());
        let dim = &QualityDimension::general()[0];

        let high = evaluator.score_dimension(&task(), &output(), dim).await;
        assert_eq!(high.score(), 10);

        let fallback = evaluator.score_dimension(&task(), &output(), dim).await;
        assert_eq!(fallback.score(), 5);
        assert!(fallback.reasoning.contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_evaluate_uses_fallback_assessment() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push_failure("DimensionProposals", "bad");
        for (score, suggestion) in [(9, "a"), (8, "b"), (4, "c"), (3, "d")] {
            scripted.push(
                "DimensionJudgement",
                json!({"score": score, "reasoning": "r", "evidence": [], "suggestions": [suggestion]}),
            );
        }
        scripted.push_failure("OverallAssessment", "bad");
        let evaluator = QualityEvaluator::new(scripted.clone());

        let result = evaluator.evaluate(&task(), &output(), 0.6, 4).await;

        assert_eq!(result.dimension_scores.len(), 4);
        assert!((result.total_weight() - 1.0).abs() < 1e-9);
        assert_eq!(result.strengths, vec!["Coverage", "Insight"]);
        assert_eq!(result.weaknesses, vec!["Clarity", "Instruction-Following"]);
        assert_eq!(result.improvements, vec!["a", "b", "c"]);
        assert!(result.summary.contains("6.0/10"));
        assert!((result.normalized_score() - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_uses_model_assessment() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "DimensionProposals",
            json!({"dimensions": [{"name": "Sourcing", "description": "", "weight": 1, "rubric": []}]}),
        );
        scripted.always(
            "DimensionJudgement",
            json!({"score": 7, "reasoning": "r", "evidence": [], "suggestions": []}),
        );
        scripted.push(
            "OverallAssessment",
            json!({"summary": "Solid", "strengths": ["well sourced"], "weaknesses": [], "improvements": ["add costs"]}),
        );
        let evaluator = QualityEvaluator::new(scripted.clone());

        let result = evaluator.evaluate(&task(), &output(), 0.6, 4).await;
        assert_eq!(result.dimension_scores.len(), 5);
        assert_eq!(result.summary, "Solid");
        assert!((result.weighted_average_score() - 7.0).abs() < 1e-9);
        assert!((result.dimension_scores[4].dimension.weight - 0.4).abs() < 1e-9);
    }
}

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use researchloops_core::{clamp_unit, EvaluationResult};
use researchloops_llm::{Field, Generable, Schema, StructuredGenerator};
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::{TuningError, TuningPrompts};

const MAX_PRIORITY_ACTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaknessCategory {
    Coverage,
    Insight,
    Accuracy,
    Clarity,
    Relevance,
}

impl WeaknessCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeaknessCategory::Coverage => "coverage",
            WeaknessCategory::Insight => "insight",
            WeaknessCategory::Accuracy => "accuracy",
            WeaknessCategory::Clarity => "clarity",
            WeaknessCategory::Relevance => "relevance",
        }
    }
}

/// Stage of the research agent's pipeline a weakness or fix belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Planning,
    Search,
    Analysis,
    Synthesis,
}

impl PipelinePhase {
    pub const ALL: [PipelinePhase; 4] = [
        PipelinePhase::Planning,
        PipelinePhase::Search,
        PipelinePhase::Analysis,
        PipelinePhase::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Planning => "planning",
            PipelinePhase::Search => "search",
            PipelinePhase::Analysis => "analysis",
            PipelinePhase::Synthesis => "synthesis",
        }
    }
}

/// Ordered so that `High > Medium > Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weakness {
    pub category: WeaknessCategory,
    pub phase: PipelinePhase,
    pub description: String,
    #[serde(deserialize_with = "researchloops_core::clamped::unit")]
    severity: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Weakness {
    pub fn new(
        category: WeaknessCategory,
        phase: PipelinePhase,
        description: impl Into<String>,
        severity: f64,
    ) -> Self {
        Self {
            category,
            phase,
            description: description.into(),
            severity: clamp_unit(severity),
            evidence: Vec::new(),
        }
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    pub phase: PipelinePhase,
    pub description: String,
    pub priority: Priority,
    #[serde(deserialize_with = "researchloops_core::clamped::unit")]
    expected_impact: f64,
    /// Prompt parameters the suggestion would touch, when known
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl ImprovementSuggestion {
    pub fn new(
        phase: PipelinePhase,
        description: impl Into<String>,
        priority: Priority,
        expected_impact: f64,
    ) -> Self {
        Self {
            phase,
            description: description.into(),
            priority,
            expected_impact: clamp_unit(expected_impact),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn expected_impact(&self) -> f64 {
        self.expected_impact
    }
}

/// One historical evaluation, reduced to its scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub overall_score: f64,
    pub quality_score: f64,
    pub accuracy: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ScoreSnapshot {
    pub fn from_result(result: &EvaluationResult) -> Self {
        Self {
            overall_score: result.overall_score,
            quality_score: result.quality.normalized_score(),
            accuracy: result.fact_check.accuracy,
            recorded_at: result.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub weaknesses: Vec<Weakness>,
    pub suggestions: BTreeMap<PipelinePhase, Vec<ImprovementSuggestion>>,
    pub priority_actions: Vec<ImprovementSuggestion>,
}

#[derive(Debug, Deserialize)]
struct WeaknessDraft {
    category: WeaknessCategory,
    phase: PipelinePhase,
    description: String,
    severity: f64,
    evidence: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WeaknessDiagnosis {
    weaknesses: Vec<WeaknessDraft>,
}

#[derive(Debug, Deserialize)]
struct SuggestionDraft {
    description: String,
    priority: Priority,
    expected_impact: f64,
    #[serde(default)]
    parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PhaseSuggestions {
    planning: Vec<SuggestionDraft>,
    search: Vec<SuggestionDraft>,
    analysis: Vec<SuggestionDraft>,
    synthesis: Vec<SuggestionDraft>,
}

fn suggestion_schema() -> Schema {
    Schema::new("Suggestion", "One improvement")
        .field(Field::string("description", "Concrete change to make"))
        .field(Field::enumeration("priority", &["high", "medium", "low"], "Urgency"))
        .field(Field::number("expected_impact", 0.0, 1.0, "Expected score impact"))
        .field(Field::strings("parameters", "Prompt parameters touched").optional())
}

lazy_static! {
    static ref WEAKNESS_DIAGNOSIS: Schema =
        Schema::new("WeaknessDiagnosis", "Diagnosed weaknesses").field(Field::objects(
            "weaknesses",
            Schema::new("Weakness", "One weakness")
                .field(Field::enumeration(
                    "category",
                    &["coverage", "insight", "accuracy", "clarity", "relevance"],
                    "Kind of weakness",
                ))
                .field(Field::enumeration(
                    "phase",
                    &["planning", "search", "analysis", "synthesis"],
                    "Pipeline phase responsible",
                ))
                .field(Field::string("description", "What is wrong"))
                .field(Field::number("severity", 0.0, 1.0, "How serious"))
                .field(Field::strings("evidence", "Supporting observations")),
            "The weaknesses, most severe first",
        ));
    static ref PHASE_SUGGESTIONS: Schema =
        Schema::new("PhaseSuggestions", "Improvement suggestions per pipeline phase")
            .field(Field::objects("planning", suggestion_schema(), "Planning phase"))
            .field(Field::objects("search", suggestion_schema(), "Search phase"))
            .field(Field::objects("analysis", suggestion_schema(), "Analysis phase"))
            .field(Field::objects("synthesis", suggestion_schema(), "Synthesis phase"));
}

impl Generable for WeaknessDiagnosis {
    fn schema() -> &'static Schema {
        &WEAKNESS_DIAGNOSIS
    }
}

impl Generable for PhaseSuggestions {
    fn schema() -> &'static Schema {
        &PHASE_SUGGESTIONS
    }
}

/// Pool suggestions from every phase, order by priority then expected
/// impact (both descending) and keep the top five.
pub fn extract_priority_actions(
    suggestions: &BTreeMap<PipelinePhase, Vec<ImprovementSuggestion>>,
) -> Vec<ImprovementSuggestion> {
    let mut pooled: Vec<ImprovementSuggestion> = suggestions.values().flatten().cloned().collect();
    pooled.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.expected_impact.total_cmp(&a.expected_impact))
    });
    pooled.truncate(MAX_PRIORITY_ACTIONS);
    pooled
}

pub struct FeedbackAnalyzer {
    generator: Arc<dyn StructuredGenerator>,
    progress: Option<ProgressCallback>,
}

impl FeedbackAnalyzer {
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

    pub async fn analyze(
        &self,
        result: &EvaluationResult,
        history: &[ScoreSnapshot],
    ) -> Result<FeedbackAnalysis, TuningError> {
        let weaknesses = self.diagnose_weaknesses(result).await?;
        let suggestions = self.generate_suggestions(result, history, &weaknesses).await?;
        let priority_actions = extract_priority_actions(&suggestions);

        if let Some(ref progress) = self.progress {
            progress(&EvaluationProgress::FeedbackAnalyzed {
                weaknesses: weaknesses.len(),
                priority_actions: priority_actions.len(),
            });
        }
        Ok(FeedbackAnalysis {
            weaknesses,
            suggestions,
            priority_actions,
        })
    }

    pub async fn diagnose_weaknesses(
        &self,
        result: &EvaluationResult,
    ) -> Result<Vec<Weakness>, TuningError> {
        let prompt = TuningPrompts::build_diagnosis_prompt(result);
        let diagnosis: WeaknessDiagnosis = self.generator.respond(&prompt).await?;
        let weaknesses: Vec<Weakness> = diagnosis
            .weaknesses
            .into_iter()
            .map(|d| {
                let mut weakness = Weakness::new(d.category, d.phase, d.description, d.severity);
                weakness.evidence = d.evidence;
                weakness
            })
            .collect();
        debug!(count = weaknesses.len(), "Diagnosed weaknesses");
        Ok(weaknesses)
    }

    /// Suggestions keyed by phase; every phase is present, possibly empty
    pub async fn generate_suggestions(
        &self,
        result: &EvaluationResult,
        history: &[ScoreSnapshot],
        weaknesses: &[Weakness],
    ) -> Result<BTreeMap<PipelinePhase, Vec<ImprovementSuggestion>>, TuningError> {
        let prompt = TuningPrompts::build_suggestions_prompt(result, history, weaknesses);
        let drafts: PhaseSuggestions = self.generator.respond(&prompt).await?;

        let convert = |phase: PipelinePhase, drafts: Vec<SuggestionDraft>| {
            drafts
                .into_iter()
                .filter(|d| !d.description.trim().is_empty())
                .map(|d| {
                    ImprovementSuggestion::new(phase, d.description, d.priority, d.expected_impact)
                        .with_parameters(d.parameters)
                })
                .collect::<Vec<_>>()
        };

        let mut by_phase = BTreeMap::new();
        by_phase.insert(PipelinePhase::Planning, convert(PipelinePhase::Planning, drafts.planning));
        by_phase.insert(PipelinePhase::Search, convert(PipelinePhase::Search, drafts.search));
        by_phase.insert(PipelinePhase::Analysis, convert(PipelinePhase::Analysis, drafts.analysis));
        by_phase.insert(
            PipelinePhase::Synthesis,
            convert(PipelinePhase::Synthesis, drafts.synthesis),
        );
        Ok(by_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(phase: PipelinePhase, priority: Priority, impact: f64, text: &str) -> ImprovementSuggestion {
        ImprovementSuggestion::new(phase, text, priority, impact)
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_extract_priority_actions_sorts_and_keeps_five() {
        let mut by_phase = BTreeMap::new();
        by_phase.insert(
            PipelinePhase::Planning,
            vec![
                suggestion(PipelinePhase::Planning, Priority::Low, 0.9, "low-high-impact"),
                suggestion(PipelinePhase::Planning, Priority::High, 0.2, "high-low-impact"),
            ],
        );
        by_phase.insert(
            PipelinePhase::Search,
            vec![
                suggestion(PipelinePhase::Search, Priority::High, 0.8, "high-high-impact"),
                suggestion(PipelinePhase::Search, Priority::Medium, 0.5, "medium"),
                suggestion(PipelinePhase::Search, Priority::Medium, 0.7, "medium-more"),
            ],
        );
        by_phase.insert(
            PipelinePhase::Synthesis,
            vec![suggestion(PipelinePhase::Synthesis, Priority::Low, 0.1, "dropped")],
        );

        let actions = extract_priority_actions(&by_phase);
        let names: Vec<_> = actions.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "high-high-impact",
                "high-low-impact",
                "medium-more",
                "medium",
                "low-high-impact"
            ]
        );
    }

    #[test]
    fn test_extract_priority_actions_empty() {
        assert!(extract_priority_actions(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_impact_and_severity_clamped() {
        assert_eq!(
            suggestion(PipelinePhase::Analysis, Priority::Low, 3.0, "x").expected_impact(),
            1.0
        );
        assert_eq!(
            Weakness::new(WeaknessCategory::Accuracy, PipelinePhase::Search, "x", -1.0).severity(),
            0.0
        );
    }

    #[test]
    fn test_stored_impact_and_severity_clamped_on_load() {
        let weakness: Weakness = serde_json::from_value(serde_json::json!({
            "category": "coverage",
            "phase": "planning",
            "description": "Skips regional sources",
            "severity": 4.2
        }))
        .unwrap();
        assert_eq!(weakness.severity(), 1.0);

        let suggestion: ImprovementSuggestion = serde_json::from_value(serde_json::json!({
            "phase": "search",
            "description": "Query regulators directly",
            "priority": "high",
            "expected_impact": -0.5
        }))
        .unwrap();
        assert_eq!(suggestion.expected_impact(), 0.0);
    }
}

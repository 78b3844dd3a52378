use lazy_static::lazy_static;
use researchloops_core::{
    EvaluationConfiguration, EvaluationOrchestrator, EvaluationTask, ResearchAgent,
};
use researchloops_llm::{Field, Generable, Schema, StructuredGenerator};
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ab_test::DEFAULT_SAMPLE_SIZE;
use crate::{
    ABTestConfiguration, ABTestResult, ABTestRunner, FeedbackAnalysis, ParameterValue,
    PromptTemplate, TuningPrompts, VersionManager,
};

const NO_ADJUSTMENTS: &str = "No adjustments were generated";
const AWAITING_VALIDATION: &str = "Awaiting validation";

/// Whether proposed adjustments are checked with an A/B test before being
/// accepted
#[derive(Clone, Default)]
pub enum ABValidation {
    /// Adjustments are applied but never accepted as improvements
    #[default]
    Disabled,
    Enabled {
        orchestrator: Arc<EvaluationOrchestrator>,
        agent: Arc<dyn ResearchAgent>,
        config: EvaluationConfiguration,
        sample_size: usize,
    },
}

impl ABValidation {
    pub fn enabled(
        orchestrator: Arc<EvaluationOrchestrator>,
        agent: Arc<dyn ResearchAgent>,
        config: EvaluationConfiguration,
    ) -> Self {
        ABValidation::Enabled {
            orchestrator,
            agent,
            config,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAdjustment {
    pub parameter_name: String,
    /// Value before the change; `None` when no template held one
    pub old_value: Option<ParameterValue>,
    pub new_value: ParameterValue,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TuningOutcome {
    Improved,
    NoChange { reason: String },
    Rollback { reason: String },
}

impl TuningOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningOutcome::Improved => "improved",
            TuningOutcome::NoChange { .. } => "no_change",
            TuningOutcome::Rollback { .. } => "rollback",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TuningOutcome::Improved => "",
            TuningOutcome::NoChange { reason } | TuningOutcome::Rollback { reason } => reason,
        }
    }

    fn no_change(reason: impl Into<String>) -> Self {
        TuningOutcome::NoChange {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTuneRun {
    pub updated_templates: Vec<PromptTemplate>,
    pub adjustments: Vec<ParameterAdjustment>,
    pub ab_test_results: Vec<ABTestResult>,
    pub result: TuningOutcome,
}

#[derive(Debug, Deserialize)]
struct AdjustmentDraft {
    parameter_name: String,
    new_value: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct AdjustmentProposals {
    adjustments: Vec<AdjustmentDraft>,
}

lazy_static! {
    static ref ADJUSTMENT_PROPOSALS: Schema =
        Schema::new("AdjustmentProposals", "Concrete prompt parameter changes").field(
            Field::objects(
                "adjustments",
                Schema::new("Adjustment", "One parameter change")
                    .field(Field::string("parameter_name", "Name of an existing parameter"))
                    .field(Field::string("new_value", "New value as plain text"))
                    .field(Field::string("reason", "Why this change addresses the actions")),
                "Parameter changes, possibly none",
            ),
        );
}

impl Generable for AdjustmentProposals {
    fn schema() -> &'static Schema {
        &ADJUSTMENT_PROPOSALS
    }
}

/// Turns priority actions into parameter adjustments and decides whether
/// to keep them.
pub struct AutoTuner {
    generator: Arc<dyn StructuredGenerator>,
    /// Percent
    min_improvement_threshold: f64,
    /// Percent
    max_degradation_threshold: f64,
    validation: ABValidation,
    versions: Option<Arc<VersionManager>>,
    progress: Option<ProgressCallback>,
}

impl AutoTuner {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        min_improvement_threshold: f64,
        max_degradation_threshold: f64,
    ) -> Self {
        Self {
            generator,
            min_improvement_threshold,
            max_degradation_threshold,
            validation: ABValidation::Disabled,
            versions: None,
            progress: None,
        }
    }

    pub fn with_validation(mut self, validation: ABValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Commit accepted parameter sets to this history
    pub fn with_versions(mut self, versions: Arc<VersionManager>) -> Self {
        self.versions = Some(versions);
        self
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

    pub async fn run(
        &self,
        feedback: &FeedbackAnalysis,
        templates: &[PromptTemplate],
        test_cases: Option<&[EvaluationTask]>,
    ) -> AutoTuneRun {
        if feedback.priority_actions.is_empty() {
            return self.finish(
                templates.to_vec(),
                Vec::new(),
                Vec::new(),
                TuningOutcome::no_change(NO_ADJUSTMENTS),
            );
        }

        let mut updated = templates.to_vec();
        let adjustments = self.propose_adjustments(feedback, &mut updated).await;
        self.emit(EvaluationProgress::AdjustmentsProposed {
            count: adjustments.len(),
        });
        if adjustments.is_empty() {
            return self.finish(
                templates.to_vec(),
                adjustments,
                Vec::new(),
                TuningOutcome::no_change(NO_ADJUSTMENTS),
            );
        }

        let ab_test_results = match test_cases {
            Some(cases) if !cases.is_empty() => {
                self.validate(&adjustments, templates, cases).await
            }
            _ => Vec::new(),
        };

        let outcome = self.decide(&ab_test_results);
        match outcome {
            TuningOutcome::Rollback { .. } => {
                self.finish(templates.to_vec(), adjustments, ab_test_results, outcome)
            }
            TuningOutcome::Improved => {
                if let (Some(versions), Some(first)) = (&self.versions, ab_test_results.first()) {
                    let description = adjustments
                        .iter()
                        .map(|a| format!("{} = {}", a.parameter_name, a.new_value))
                        .collect::<Vec<_>>()
                        .join(", ");
                    versions.commit(merged_values(&updated), first.variant_mean, description);
                }
                self.finish(updated, adjustments, ab_test_results, outcome)
            }
            TuningOutcome::NoChange { .. } => {
                self.finish(updated, adjustments, ab_test_results, outcome)
            }
        }
    }

    /// Ask for adjustments and apply them to `templates` in place. Only
    /// parameters declared by at least one template survive.
    async fn propose_adjustments(
        &self,
        feedback: &FeedbackAnalysis,
        templates: &mut [PromptTemplate],
    ) -> Vec<ParameterAdjustment> {
        let prompt = TuningPrompts::build_adjustment_prompt(&feedback.priority_actions, templates);
        let proposals: AdjustmentProposals = match self.generator.respond(&prompt).await {
            Ok(proposals) => proposals,
            Err(e) => {
                warn!(error = %e, "Could not generate parameter adjustments");
                return Vec::new();
            }
        };

        let mut adjustments = Vec::new();
        for draft in last_proposal_per_parameter(proposals.adjustments) {
            if let Some(adjustment) = apply_adjustment(templates, draft) {
                adjustments.push(adjustment);
            }
        }
        debug!(count = adjustments.len(), "Applied parameter adjustments");
        adjustments
    }

    /// One A/B test per adjustment, each against the original template
    async fn validate(
        &self,
        adjustments: &[ParameterAdjustment],
        originals: &[PromptTemplate],
        test_cases: &[EvaluationTask],
    ) -> Vec<ABTestResult> {
        let ABValidation::Enabled {
            orchestrator,
            agent,
            config,
            sample_size,
        } = &self.validation
        else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for adjustment in adjustments {
            let Some(template) = originals
                .iter()
                .find(|t| t.contains(&adjustment.parameter_name))
            else {
                continue;
            };
            let baseline = adjustment
                .old_value
                .clone()
                .or_else(|| template.value(&adjustment.parameter_name).cloned());
            let Some(baseline) = baseline else {
                continue;
            };

            let configuration = ABTestConfiguration::new(
                adjustment.parameter_name.clone(),
                baseline,
                adjustment.new_value.clone(),
            )
            .with_sample_size(*sample_size)
            .with_min_improvement(self.min_improvement_threshold);

            let runner = match ABTestRunner::new(
                orchestrator.clone(),
                agent.clone(),
                template.clone(),
                config.clone(),
                configuration,
            ) {
                Ok(runner) => runner,
                Err(e) => {
                    warn!(parameter = %adjustment.parameter_name, error = %e, "Skipping A/B test");
                    continue;
                }
            };
            let runner = match self.progress {
                Some(ref progress) => runner.with_progress(progress.clone()),
                None => runner,
            };
            results.push(runner.run(test_cases).await);
        }
        results
    }

    /// Decision over the first A/B result
    fn decide(&self, results: &[ABTestResult]) -> TuningOutcome {
        let Some(first) = results.first() else {
            return TuningOutcome::no_change(AWAITING_VALIDATION);
        };
        if first.should_accept {
            TuningOutcome::Improved
        } else if first.improvement_percentage < -self.max_degradation_threshold {
            TuningOutcome::Rollback {
                reason: format!(
                    "Variant degraded the score by {:.1}% (limit {:.1}%)",
                    -first.improvement_percentage, self.max_degradation_threshold
                ),
            }
        } else {
            TuningOutcome::no_change(AWAITING_VALIDATION)
        }
    }

    fn finish(
        &self,
        updated_templates: Vec<PromptTemplate>,
        adjustments: Vec<ParameterAdjustment>,
        ab_test_results: Vec<ABTestResult>,
        result: TuningOutcome,
    ) -> AutoTuneRun {
        info!(
            decision = result.as_str(),
            reason = result.reason(),
            adjustments = adjustments.len(),
            "Tuning decided"
        );
        self.emit(EvaluationProgress::TuningDecided {
            decision: result.as_str().to_string(),
            reason: result.reason().to_string(),
        });
        AutoTuneRun {
            updated_templates,
            adjustments,
            ab_test_results,
            result,
        }
    }
}

/// Apply one proposed change to every template declaring the parameter.
/// Returns `None` when no template declares it, the value does not parse,
/// or no template's value actually changed.
/// Keep only the last proposal for each parameter, in proposal order
fn last_proposal_per_parameter(drafts: Vec<AdjustmentDraft>) -> Vec<AdjustmentDraft> {
    let mut kept: Vec<AdjustmentDraft> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let name = draft.parameter_name.trim();
        kept.retain(|k| k.parameter_name.trim() != name);
        kept.push(draft);
    }
    kept
}

fn apply_adjustment(
    templates: &mut [PromptTemplate],
    draft: AdjustmentDraft,
) -> Option<ParameterAdjustment> {
    let name = draft.parameter_name.trim();
    if !templates.iter().any(|t| t.contains(name)) {
        debug!(parameter = name, "Ignoring adjustment to unknown parameter");
        return None;
    }

    let mut old_value = None;
    let mut new_value = None;
    let mut changed = false;
    for template in templates.iter_mut().filter(|t| t.contains(name)) {
        let before = template.value(name).cloned();
        let parsed = match template.parameter(name).map(|p| p.parse_value(&draft.new_value)) {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                warn!(template = %template.name, error = %e, "Rejected adjustment");
                continue;
            }
            None => continue,
        };
        match template.set_value(name, parsed) {
            Ok(stored) => {
                changed |= before.as_ref() != Some(&stored);
                if new_value.is_none() {
                    old_value = before;
                    new_value = Some(stored);
                }
            }
            Err(e) => warn!(template = %template.name, error = %e, "Rejected adjustment"),
        }
    }

    if !changed {
        return None;
    }
    Some(ParameterAdjustment {
        parameter_name: name.to_string(),
        old_value,
        new_value: new_value?,
        reason: draft.reason,
    })
}

/// Effective parameter values across templates; earlier templates win
fn merged_values(templates: &[PromptTemplate]) -> BTreeMap<String, ParameterValue> {
    let mut merged = BTreeMap::new();
    for template in templates {
        for (name, value) in template.values() {
            merged.entry(name).or_insert(value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParameterType, PromptParameter};

    fn templates() -> Vec<PromptTemplate> {
        vec![
            PromptTemplate::new(
                "planner",
                "Plan {{depth}} levels deep",
                vec![PromptParameter::new("depth", ParameterType::Int, ParameterValue::Int(2))
                    .with_bounds(1.0, 5.0)],
            ),
            PromptTemplate::new(
                "writer",
                "Write in a {{tone}} tone, {{depth}} sections",
                vec![
                    PromptParameter::new(
                        "tone",
                        ParameterType::String,
                        ParameterValue::String("neutral".into()),
                    ),
                    PromptParameter::new("depth", ParameterType::Int, ParameterValue::Int(3))
                        .with_bounds(1.0, 5.0),
                ],
            ),
        ]
    }

    fn draft(name: &str, value: &str) -> AdjustmentDraft {
        AdjustmentDraft {
            parameter_name: name.to_string(),
            new_value: value.to_string(),
            reason: "because".to_string(),
        }
    }

    #[test]
    fn test_apply_adjustment_updates_every_declaring_template() {
        let mut templates = templates();
        let adjustment = apply_adjustment(&mut templates, draft("depth", "4")).unwrap();
        assert_eq!(adjustment.old_value, Some(ParameterValue::Int(2)));
        assert_eq!(adjustment.new_value, ParameterValue::Int(4));
        assert_eq!(templates[0].value("depth"), Some(&ParameterValue::Int(4)));
        assert_eq!(templates[1].value("depth"), Some(&ParameterValue::Int(4)));
    }

    #[test]
    fn test_apply_adjustment_leaves_other_templates_untouched() {
        let mut templates = templates();
        apply_adjustment(&mut templates, draft("tone", "formal")).unwrap();
        assert!(!templates[0].contains("tone"));
        assert_eq!(templates[0].render(), "Plan 2 levels deep");
        assert_eq!(
            templates[1].value("tone"),
            Some(&ParameterValue::String("formal".into()))
        );
    }

    #[test]
    fn test_apply_adjustment_rejects_unknown_and_unchanged() {
        let mut templates = templates();
        assert!(apply_adjustment(&mut templates, draft("temperature", "0.2")).is_none());
        assert!(apply_adjustment(&mut templates, draft("tone", "neutral")).is_none());
        assert!(apply_adjustment(&mut templates, draft("depth", "many")).is_none());
    }

    #[test]
    fn test_repeated_proposals_keep_the_last() {
        let drafts = vec![
            draft("depth", "4"),
            draft("tone", "formal"),
            draft(" depth ", "5"),
        ];
        let kept = last_proposal_per_parameter(drafts);
        let values: Vec<&str> = kept.iter().map(|d| d.new_value.as_str()).collect();
        assert_eq!(values, vec!["formal", "5"]);
    }

    #[test]
    fn test_merged_values_prefers_first_template() {
        let merged = merged_values(&templates());
        assert_eq!(merged.get("depth"), Some(&ParameterValue::Int(2)));
        assert_eq!(
            merged.get("tone"),
            Some(&ParameterValue::String("neutral".into()))
        );
    }

    #[test]
    fn test_outcome_serializes_with_decision_tag() {
        let json = serde_json::to_value(TuningOutcome::no_change("x")).unwrap();
        assert_eq!(json["decision"], "no_change");
        assert_eq!(json["reason"], "x");
    }
}

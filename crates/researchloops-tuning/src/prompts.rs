use researchloops_core::EvaluationResult;

use crate::{ImprovementSuggestion, PromptTemplate, ScoreSnapshot, Weakness};

const DIAGNOSIS_CORRECTIONS: usize = 5;
const SUGGESTION_HISTORY: usize = 5;
const SUGGESTION_CORRECTIONS: usize = 3;

/// Prompt builders for feedback analysis and tuning
pub struct TuningPrompts;

impl TuningPrompts {
    pub fn build_diagnosis_prompt(result: &EvaluationResult) -> String {
        format!(
            r#"You are auditing a deep-research agent. Diagnose the weaknesses behind this evaluation.

## Research Objective
{objective}

## Quality Summary
{summary}

## Dimension Scores
{dimensions}

## Fact Check
{facts}

## Factual Errors
{corrections}

For each weakness give its category (coverage, insight, accuracy, clarity or relevance), the pipeline phase responsible (planning, search, analysis or synthesis), a severity from 0.0 to 1.0, and the evidence for it."#,
            objective = result.task.objective,
            summary = result.quality.summary,
            dimensions = dimension_lines(result),
            facts = fact_counts(result),
            corrections = correction_lines(result, DIAGNOSIS_CORRECTIONS),
        )
    }

    pub fn build_suggestions_prompt(
        result: &EvaluationResult,
        history: &[ScoreSnapshot],
        weaknesses: &[Weakness],
    ) -> String {
        let history_lines = if history.is_empty() {
            "(no previous runs)".to_string()
        } else {
            history
                .iter()
                .rev()
                .take(SUGGESTION_HISTORY)
                .map(|h| {
                    format!(
                        "- {}: overall {:.1}, quality {:.1}, accuracy {:.1}",
                        h.recorded_at.format("%Y-%m-%d %H:%M"),
                        h.overall_score,
                        h.quality_score,
                        h.accuracy
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let weakness_lines = if weaknesses.is_empty() {
            "(none diagnosed)".to_string()
        } else {
            weaknesses
                .iter()
                .map(|w| {
                    format!(
                        "- [{} / {} / severity {:.2}] {}",
                        w.category.as_str(),
                        w.phase.as_str(),
                        w.severity(),
                        w.description
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"Propose improvements to a deep-research agent's pipeline.

## Current Scores
- Overall: {overall:.1}
- Quality: {quality:.1}
- Factual accuracy: {accuracy:.1}

## Recent History
{history}

## Diagnosed Weaknesses
{weaknesses}

## Quality Review
- Strengths: {strengths}
- Weaknesses: {quality_weaknesses}
- Improvements: {improvements}

## Factual Errors
{corrections}

Group suggestions by pipeline phase: planning, search, analysis and synthesis. For each give a concrete description, a priority (high, medium or low), the expected impact from 0.0 to 1.0, and the prompt parameters it would touch if you can name them."#,
            overall = result.overall_score,
            quality = result.quality.normalized_score(),
            accuracy = result.fact_check.accuracy,
            history = history_lines,
            weaknesses = weakness_lines,
            strengths = join_or_none(&result.quality.strengths),
            quality_weaknesses = join_or_none(&result.quality.weaknesses),
            improvements = join_or_none(&result.quality.improvements),
            corrections = correction_lines(result, SUGGESTION_CORRECTIONS),
        )
    }

    pub fn build_adjustment_prompt(
        actions: &[ImprovementSuggestion],
        templates: &[PromptTemplate],
    ) -> String {
        let action_lines = actions
            .iter()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "{}. [{} priority, {} phase, impact {:.2}] {}",
                    i + 1,
                    a.priority.as_str(),
                    a.phase.as_str(),
                    a.expected_impact(),
                    a.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut parameter_lines = Vec::new();
        for template in templates {
            for parameter in &template.parameters {
                let mut line = format!(
                    "- `{}` in `{}` ({}): current {}",
                    parameter.name,
                    template.name,
                    parameter.kind,
                    template
                        .value(&parameter.name)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
                if let (Some(lo), Some(hi)) = (parameter.min, parameter.max) {
                    line.push_str(&format!(", range {}..{}", lo, hi));
                }
                if !parameter.allowed_values.is_empty() {
                    line.push_str(&format!(", one of {}", parameter.allowed_values.join(" | ")));
                }
                if !parameter.description.is_empty() {
                    line.push_str(&format!(". {}", parameter.description));
                }
                parameter_lines.push(line);
            }
        }

        format!(
            r#"Translate improvement suggestions into concrete prompt-parameter changes.

## Priority Actions
{actions}

## Tunable Parameters
{parameters}

Only adjust parameters listed above. For each change give the parameter name, the new value written as plain text (lists as a JSON array of strings), and the reason. Propose nothing if no parameter addresses the actions."#,
            actions = action_lines,
            parameters = if parameter_lines.is_empty() {
                "(none)".to_string()
            } else {
                parameter_lines.join("\n")
            },
        )
    }
}

fn dimension_lines(result: &EvaluationResult) -> String {
    result
        .quality
        .dimension_scores
        .iter()
        .map(|s| format!("- {} ({}/10): {}", s.dimension.name, s.score(), s.reasoning))
        .collect::<Vec<_>>()
        .join("\n")
}

fn fact_counts(result: &EvaluationResult) -> String {
    let f = &result.fact_check;
    format!(
        "{} statements: {} correct, {} incorrect, {} partially correct, {} unknown, {} errors. Accuracy {:.1}%.",
        f.total_statements,
        f.correct_count,
        f.incorrect_count,
        f.partially_correct_count,
        f.unknown_count,
        f.error_count,
        f.accuracy
    )
}

fn correction_lines(result: &EvaluationResult, limit: usize) -> String {
    let lines: Vec<String> = result
        .fact_check
        .errors_with_corrections()
        .take(limit)
        .map(|(statement, correction)| {
            format!(
                "- \"{}\" -> {}",
                statement,
                correction.unwrap_or("(no correction given)")
            )
        })
        .collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join("; ")
    }
}

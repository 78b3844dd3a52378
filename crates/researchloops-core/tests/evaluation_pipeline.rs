use researchloops_core::{
    BatchInput, Domain, EvaluationConfiguration, EvaluationOrchestrator, EvaluationTask,
    FactChecker, QualityEvaluator, ResearchOutcome, ResearchOutput, StatementType, Verdict,
    VerifiableStatement,
};
use researchloops_llm::testing::ScriptedGenerator;
use researchloops_logging::EvaluationProgress;
use researchloops_web::testing::{StaticFetcher, StaticSearch};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

fn task() -> EvaluationTask {
    EvaluationTask::from_objective("How did 2025 chip export rules change?", Domain::Politics)
}

fn answer() -> ResearchOutput {
    ResearchOutput::new("# Export rules\nThe rules were tightened in January 2025.")
        .with_sources(vec!["https://gov.example/rules".into()])
}

fn fact_checker(scripted: &Arc<ScriptedGenerator>) -> FactChecker {
    let search = StaticSearch::new(vec!["https://gov.example/rules".into()]);
    let fetcher = StaticFetcher::new().with_page(
        "https://gov.example/rules",
        "Export rules",
        "Rules tightened in January 2025.",
    );
    FactChecker::new(scripted.clone(), Arc::new(search), Arc::new(fetcher))
}

/// Deterministic responses for every schema the evaluators use
fn scripted_everything() -> Arc<ScriptedGenerator> {
    let scripted = Arc::new(ScriptedGenerator::new());
    scripted.always(
        "DimensionProposals",
        json!({"dimensions": [
            {"name": "Regulatory Precision", "description": "Cites rule numbers", "weight": 0.5, "rubric": []},
            {"name": "Timeline Accuracy", "description": "Dates are right", "weight": 0.5, "rubric": []}
        ]}),
    );
    scripted.always(
        "DimensionJudgement",
        json!({"score": 8, "reasoning": "good", "evidence": ["tightened"], "suggestions": ["cite rule ids"]}),
    );
    scripted.always(
        "OverallAssessment",
        json!({"summary": "Accurate and focused", "strengths": ["dates"], "weaknesses": ["depth"], "improvements": ["more detail"]}),
    );
    scripted.always(
        "ExtractedStatements",
        json!({"statements": [
            {"text": "The rules were tightened in January 2025", "statement_type": "temporal", "confidence": 0.9, "search_query": "chip export rules january 2025"}
        ]}),
    );
    scripted.always(
        "EvidenceAssessment",
        json!({"support_level": "strong_support", "relevant_text": "Rules tightened in January 2025.", "credibility": 0.9}),
    );
    scripted.always(
        "VerificationJudgement",
        json!({"verdict": "correct", "confidence": 0.9, "explanation": "Matches the notice"}),
    );
    scripted
}

fn orchestrator(scripted: &Arc<ScriptedGenerator>) -> EvaluationOrchestrator {
    EvaluationOrchestrator::new(QualityEvaluator::new(scripted.clone()), fact_checker(scripted))
}

#[tokio::test]
async fn test_zero_extracted_statements_yield_empty_fact_check() {
    let scripted = Arc::new(ScriptedGenerator::new());
    scripted.push("ExtractedStatements", json!({"statements": []}));

    let result = fact_checker(&scripted)
        .orchestrate(&answer(), 10, 3, 0.7)
        .await;

    assert_eq!(result.total_statements, 0);
    assert_eq!(result.accuracy, 0.0);
    assert_eq!(result.correct_count, 0);
    assert_eq!(result.incorrect_count, 0);
    assert_eq!(result.unknown_count, 0);
    assert_eq!(result.partially_correct_count, 0);
    assert_eq!(result.error_count, 0);
}

#[tokio::test]
async fn test_empty_evidence_is_unknown_without_model_call() {
    let scripted = Arc::new(ScriptedGenerator::new());
    let statement =
        VerifiableStatement::new("Chip exports fell 12%", StatementType::Numeric, "Trade", 0.8);

    let result = fact_checker(&scripted)
        .verify(&statement, Vec::new(), 0.7)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::Unknown);
    assert_eq!(result.confidence(), 0.0);
    assert_eq!(scripted.calls(), 0);
}

#[tokio::test]
async fn test_general_and_task_specific_weight_split() {
    let scripted = scripted_everything();
    let evaluator = QualityEvaluator::new(scripted.clone());

    let result = evaluator.evaluate(&task(), &answer(), 0.6, 4).await;

    let (general, specific): (Vec<_>, Vec<_>) = result
        .dimension_scores
        .iter()
        .partition(|s| s.dimension.is_general);
    assert_eq!(general.len(), 4);
    assert_eq!(specific.len(), 2);
    assert!(general.iter().all(|s| (s.dimension.weight - 0.15).abs() < 1e-9));
    assert!(specific.iter().all(|s| (s.dimension.weight - 0.2).abs() < 1e-9));
    assert!((result.total_weight() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_parallel_and_sequential_agree() {
    let scripted = scripted_everything();
    let orchestrator = orchestrator(&scripted);

    let parallel = EvaluationConfiguration::default();
    let sequential = EvaluationConfiguration {
        run_evaluations_in_parallel: false,
        ..Default::default()
    };

    let a = orchestrator.evaluate(&task(), &answer(), &parallel).await;
    let b = orchestrator.evaluate(&task(), &answer(), &sequential).await;

    assert_eq!(a.overall_score, b.overall_score);
    assert_eq!(a.quality.normalized_score(), b.quality.normalized_score());
    assert_eq!(a.fact_check.accuracy, b.fact_check.accuracy);
    assert_eq!(a.fact_check.total_statements, b.fact_check.total_statements);
    // quality 80, accuracy 100
    assert!((a.overall_score - (80.0 * 0.6 + 100.0 * 0.4)).abs() < 1e-9);
}

#[tokio::test]
async fn test_overall_score_uses_configured_blend_weights() {
    let scripted = scripted_everything();
    let config = EvaluationConfiguration {
        general_dimension_weight: 0.5,
        task_specific_dimension_weight: 0.3,
        ..Default::default()
    };

    let result = orchestrator(&scripted).evaluate(&task(), &answer(), &config).await;

    assert_eq!((result.quality_weight, result.factual_weight), (0.5, 0.3));
    assert!((result.overall_score - (80.0 * 0.5 + 100.0 * 0.3)).abs() < 1e-9);
}

#[tokio::test]
async fn test_batch_skips_failed_research_and_reports_progress() {
    let scripted = scripted_everything();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = orchestrator(&scripted).with_progress(Arc::new(
        move |e: &EvaluationProgress| sink.lock().unwrap().push(e.clone()),
    ));

    let inputs = vec![
        BatchInput {
            task: task(),
            outcome: ResearchOutcome::Completed(answer()),
        },
        BatchInput {
            task: task(),
            outcome: ResearchOutcome::Failed("agent timed out".into()),
        },
    ];
    let batch = orchestrator
        .evaluate_batch(inputs, &EvaluationConfiguration::default())
        .await;

    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].reason, "agent timed out");
    assert_eq!(batch.statistics.count, 1);
    assert_eq!(batch.statistics.pass_rate, 1.0);
    assert!(batch.by_domain.contains_key(&Domain::Politics));
    assert!(!batch.interrupted);

    let events = events.lock().unwrap();
    assert!(matches!(
        events.last(),
        Some(EvaluationProgress::BatchCompleted { evaluated: 1, failed: 1, .. })
    ));
}

#[tokio::test]
async fn test_interrupted_batch_stops_before_next_item() {
    let scripted = scripted_everything();
    let orchestrator = orchestrator(&scripted);
    orchestrator.interrupt_handle().store(true, Ordering::SeqCst);

    let inputs = vec![BatchInput {
        task: task(),
        outcome: ResearchOutcome::Completed(answer()),
    }];
    let batch = orchestrator
        .evaluate_batch(inputs, &EvaluationConfiguration::default())
        .await;

    assert!(batch.interrupted);
    assert!(batch.results.is_empty());
    assert_eq!(scripted.calls(), 0);
}

use chrono::Utc;
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::{
    BatchEvaluationResult, BatchFailure, EvaluationConfiguration, EvaluationResult,
    EvaluationTask, FactChecker, QualityEvaluator, ResearchOutput,
};

/// What the research agent produced for one task
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchOutcome {
    Completed(ResearchOutput),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BatchInput {
    pub task: EvaluationTask,
    pub outcome: ResearchOutcome,
}

/// Runs quality scoring and fact checking for a task and blends the results.
///
/// The two evaluators should hold independent generators when
/// `run_evaluations_in_parallel` is set.
pub struct EvaluationOrchestrator {
    quality: QualityEvaluator,
    fact_checker: FactChecker,
    progress: Option<ProgressCallback>,
    interrupt: Arc<AtomicBool>,
}

impl EvaluationOrchestrator {
    pub fn new(quality: QualityEvaluator, fact_checker: FactChecker) -> Self {
        Self {
            quality,
            fact_checker,
            progress: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Flag checked between batch items; set it to stop a batch early
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    fn emit(&self, event: EvaluationProgress) {
        if let Some(ref progress) = self.progress {
            progress(&event);
        }
    }

    pub async fn evaluate(
        &self,
        task: &EvaluationTask,
        output: &ResearchOutput,
        config: &EvaluationConfiguration,
    ) -> EvaluationResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.emit(EvaluationProgress::EvaluationStarted {
            task_id: task.id.to_string(),
            objective: task.objective.clone(),
        });

        let quality = self.quality.evaluate(
            task,
            output,
            config.general_dimension_weight,
            config.max_task_specific_dimensions,
        );
        let facts = self.fact_checker.orchestrate(
            output,
            config.max_statements_to_verify,
            config.evidence_per_statement,
            config.verification_confidence_threshold,
        );
        let (quality, facts) = if config.run_evaluations_in_parallel {
            tokio::join!(quality, facts)
        } else {
            (quality.await, facts.await)
        };

        let elapsed = clock.elapsed();
        if elapsed > config.operation_timeout {
            warn!(
                task_id = %task.id,
                elapsed_secs = elapsed.as_secs_f64(),
                target_secs = config.operation_timeout.as_secs_f64(),
                "Evaluation exceeded the operation timeout"
            );
        }

        let result = EvaluationResult::new(
            task.clone(),
            output.clone(),
            quality,
            facts,
            config.blend_weights(),
            started_at,
        );
        info!(
            task_id = %task.id,
            overall = result.overall_score,
            quality = result.quality.normalized_score(),
            accuracy = result.fact_check.accuracy,
            "Evaluation complete"
        );
        self.emit(EvaluationProgress::EvaluationCompleted {
            task_id: task.id.to_string(),
            overall_score: result.overall_score,
            duration_secs: elapsed.as_secs_f64(),
        });
        result
    }

    /// Evaluate each input in turn. Failed research runs are recorded and
    /// excluded from the statistics; an interrupt stops before the next item.
    pub async fn evaluate_batch(
        &self,
        inputs: Vec<BatchInput>,
        config: &EvaluationConfiguration,
    ) -> BatchEvaluationResult {
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut interrupted = false;

        for input in inputs {
            if self.interrupt.load(Ordering::SeqCst) {
                warn!("Batch interrupted");
                interrupted = true;
                break;
            }
            match input.outcome {
                ResearchOutcome::Completed(output) => {
                    results.push(self.evaluate(&input.task, &output, config).await);
                }
                ResearchOutcome::Failed(reason) => {
                    warn!(task_id = %input.task.id, %reason, "Research failed, skipping evaluation");
                    failures.push(BatchFailure {
                        task_id: input.task.id.to_string(),
                        objective: input.task.objective.clone(),
                        reason,
                    });
                }
            }
        }

        let batch = BatchEvaluationResult::new(results, failures, config.pass_threshold, interrupted);
        self.emit(EvaluationProgress::BatchCompleted {
            evaluated: batch.results.len(),
            failed: batch.failures.len(),
            mean_score: batch.statistics.mean,
        });
        batch
    }
}

//! Fact-check pipeline.
//!
//! Each statement moves Extracted -> EvidenceRetrieved -> Verified, or ends
//! in an error verdict. A failing statement never aborts the batch.

mod extraction;
mod retrieval;
mod verification;

use researchloops_llm::StructuredGenerator;
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use researchloops_web::{PageFetch, WebSearch};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{FactCheckResult, FactVerificationResult, ResearchOutput};

/// At most this many search queries are issued per statement
pub const MAX_QUERIES_PER_STATEMENT: usize = 2;

pub struct FactChecker {
    generator: Arc<dyn StructuredGenerator>,
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn PageFetch>,
    fetch_timeout: Duration,
    progress: Option<ProgressCallback>,
}

impl FactChecker {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        search: Arc<dyn WebSearch>,
        fetcher: Arc<dyn PageFetch>,
    ) -> Self {
        Self {
            generator,
            search,
            fetcher,
            fetch_timeout: Duration::from_secs(10),
            progress: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
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

    /// Extract, then retrieve evidence for and verify each statement in turn
    pub async fn orchestrate(
        &self,
        output: &ResearchOutput,
        max_statements: usize,
        evidence_per_statement: usize,
        confidence_threshold: f64,
    ) -> FactCheckResult {
        let statements = self.extract_statements(output, max_statements).await;

        let mut verifications = Vec::with_capacity(statements.len());
        for statement in statements {
            let evidence = self
                .retrieve_evidence(&statement, evidence_per_statement, None)
                .await;
            self.emit(EvaluationProgress::EvidenceRetrieved {
                statement_id: statement.id.clone(),
                evidence_count: evidence.len(),
            });

            let verification = match self
                .verify(&statement, evidence, confidence_threshold)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(statement_id = %statement.id, error = %e, "Statement verification failed");
                    FactVerificationResult::error(statement, e.to_string())
                }
            };
            self.emit(EvaluationProgress::StatementVerified {
                statement_id: verification.statement.id.clone(),
                verdict: verification.verdict.to_string(),
                confidence: verification.confidence(),
            });
            verifications.push(verification);
        }

        let result = FactCheckResult::from_verifications(verifications);
        info!(
            statements = result.total_statements,
            accuracy = result.accuracy,
            "Fact check complete"
        );
        self.emit(EvaluationProgress::FactCheckCompleted {
            total_statements: result.total_statements,
            accuracy: result.accuracy,
        });
        result
    }
}

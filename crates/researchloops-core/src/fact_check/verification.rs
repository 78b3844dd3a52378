use lazy_static::lazy_static;
use researchloops_llm::{Field, Generable, GenerationError, Schema};
use serde::Deserialize;
use tracing::debug;

use super::FactChecker;
use crate::{EvaluationPrompts, Evidence, FactVerificationResult, VerifiableStatement, Verdict};

#[derive(Debug, Deserialize)]
struct VerificationJudgement {
    verdict: Verdict,
    confidence: f64,
    explanation: String,
    correction: Option<String>,
}

lazy_static! {
    static ref VERIFICATION_JUDGEMENT: Schema =
        Schema::new("VerificationJudgement", "Verdict on a claim given evidence")
            .field(Field::enumeration(
                "verdict",
                &["correct", "incorrect", "partially_correct", "unknown"],
                "Verdict on the claim",
            ))
            .field(Field::number("confidence", 0.0, 1.0, "Confidence in the verdict"))
            .field(Field::string("explanation", "Why, citing sources"))
            .field(
                Field::string(
                    "correction",
                    "Corrected claim, only when incorrect or partially correct",
                )
                .optional(),
            );
}

impl Generable for VerificationJudgement {
    fn schema() -> &'static Schema {
        &VERIFICATION_JUDGEMENT
    }
}

impl FactChecker {
    /// Judge a statement against its evidence.
    ///
    /// Empty evidence yields `unknown` with confidence 0 and no model call.
    pub async fn verify(
        &self,
        statement: &VerifiableStatement,
        evidence: Vec<Evidence>,
        confidence_threshold: f64,
    ) -> Result<FactVerificationResult, GenerationError> {
        if evidence.is_empty() {
            debug!(statement_id = %statement.id, "No evidence, verdict unknown");
            return Ok(FactVerificationResult::unknown(statement.clone()));
        }

        let prompt =
            EvaluationPrompts::build_verification_prompt(statement, &evidence, confidence_threshold);
        let judgement: VerificationJudgement = self.generator.respond(&prompt).await?;

        Ok(FactVerificationResult::new(
            statement.clone(),
            judgement.verdict,
            evidence,
            judgement.confidence,
            judgement.explanation,
            judgement.correction,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StatementType, SupportLevel};
    use researchloops_llm::testing::ScriptedGenerator;
    use researchloops_web::testing::{StaticFetcher, StaticSearch};
    use serde_json::json;
    use std::sync::Arc;

    fn checker(scripted: &Arc<ScriptedGenerator>) -> FactChecker {
        FactChecker::new(
            scripted.clone(),
            Arc::new(StaticSearch::default()),
            Arc::new(StaticFetcher::new()),
        )
    }

    fn statement() -> VerifiableStatement {
        VerifiableStatement::new("Water boils at 100 C at sea level", StatementType::Numeric, "", 1.0)
    }

    #[tokio::test]
    async fn test_correct_verdict_drops_correction() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "VerificationJudgement",
            json!({"verdict": "correct", "confidence": 0.95, "explanation": "Textbook", "correction": "unneeded"}),
        );
        let evidence = vec![Evidence::new("https://a", "A", "100 C", SupportLevel::StrongSupport, 0.9)];

        let result = checker(&scripted).verify(&statement(), evidence, 0.7).await.unwrap();
        assert_eq!(result.verdict, Verdict::Correct);
        assert_eq!(result.correction(), None);
        assert_eq!(result.evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_partially_correct_keeps_correction() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "VerificationJudgement",
            json!({"verdict": "partiallyCorrect", "confidence": 0.6, "explanation": "Depends on pressure", "correction": "At 1 atm"}),
        );
        let evidence = vec![Evidence::new("https://a", "A", "at 1 atm", SupportLevel::Support, 0.8)];

        let result = checker(&scripted).verify(&statement(), evidence, 0.7).await.unwrap();
        assert_eq!(result.verdict, Verdict::PartiallyCorrect);
        assert_eq!(result.correction(), Some("At 1 atm"));
    }

    #[tokio::test]
    async fn test_generation_error_propagates_from_verify() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push_failure("VerificationJudgement", "garbled");
        let evidence = vec![Evidence::new("https://a", "A", "x", SupportLevel::Support, 0.8)];
        assert!(checker(&scripted).verify(&statement(), evidence, 0.7).await.is_err());
    }
}

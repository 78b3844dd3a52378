use lazy_static::lazy_static;
use researchloops_llm::{Field, Generable, Schema};
use researchloops_logging::EvaluationProgress;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

use super::FactChecker;
use crate::{EvaluationPrompts, ResearchOutput, StatementType, VerifiableStatement};

#[derive(Debug, Deserialize)]
struct StatementDraft {
    text: String,
    statement_type: StatementType,
    #[serde(default)]
    source_section: String,
    confidence: f64,
    search_query: Option<String>,
    line_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ExtractedStatements {
    statements: Vec<StatementDraft>,
}

lazy_static! {
    static ref EXTRACTED_STATEMENTS: Schema =
        Schema::new("ExtractedStatements", "Verifiable statements, most important first")
            .field(Field::objects(
                "statements",
                Schema::new("Statement", "One verifiable claim")
                    .field(Field::string("text", "The claim exactly as stated"))
                    .field(Field::enumeration(
                        "statement_type",
                        &["numeric", "temporal", "entity", "causal", "comparative"],
                        "Kind of claim",
                    ))
                    .field(Field::string("source_section", "Report section").optional())
                    .field(Field::number("confidence", 0.0, 1.0, "How verifiable the claim is"))
                    .field(Field::string("search_query", "Query that would verify it").optional())
                    .field(Field::integer("line_number", 1, 100_000, "Line in the report").optional()),
                "The statements",
            ));
}

impl Generable for ExtractedStatements {
    fn schema() -> &'static Schema {
        &EXTRACTED_STATEMENTS
    }
}

impl FactChecker {
    /// Statements in the model's priority order, truncated to `max_statements`.
    ///
    /// Returns an empty list when extraction fails.
    pub async fn extract_statements(
        &self,
        output: &ResearchOutput,
        max_statements: usize,
    ) -> Vec<VerifiableStatement> {
        let prompt = EvaluationPrompts::build_extraction_prompt(output, max_statements);
        let extracted: ExtractedStatements = match self.generator.respond(&prompt).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Statement extraction failed, fact check proceeds with no statements");
                self.emit(EvaluationProgress::StatementsExtracted { count: 0 });
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let statements: Vec<VerifiableStatement> = extracted
            .statements
            .into_iter()
            .filter(|d| !d.text.trim().is_empty())
            .map(|d| {
                VerifiableStatement::new(d.text, d.statement_type, d.source_section, d.confidence)
                    .with_suggested_query(d.search_query)
                    .with_line_number(d.line_number.and_then(|n| u32::try_from(n).ok()))
            })
            .filter(|s| seen.insert(s.id.clone()))
            .take(max_statements)
            .collect();

        self.emit(EvaluationProgress::StatementsExtracted {
            count: statements.len(),
        });
        statements
    }
}

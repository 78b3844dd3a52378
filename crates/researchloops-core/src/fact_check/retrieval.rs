use lazy_static::lazy_static;
use researchloops_llm::{Field, Generable, GenerationError, Schema};
use researchloops_web::FetchedPage;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{FactChecker, MAX_QUERIES_PER_STATEMENT};
use crate::{EvaluationPrompts, Evidence, SupportLevel, VerifiableStatement};

#[derive(Debug, Deserialize)]
struct SearchQueries {
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EvidenceAssessment {
    support_level: SupportLevel,
    relevant_text: String,
    credibility: f64,
}

lazy_static! {
    static ref SEARCH_QUERIES: Schema = Schema::new("SearchQueries", "Web search queries")
        .field(Field::strings("queries", "Short specific queries, best first"));
    static ref EVIDENCE_ASSESSMENT: Schema =
        Schema::new("EvidenceAssessment", "How a page bears on a claim")
            .field(Field::enumeration(
                "support_level",
                &[
                    "strong_support",
                    "support",
                    "neutral",
                    "contradict",
                    "strong_contradict",
                ],
                "Stance of the page toward the claim",
            ))
            .field(Field::string(
                "relevant_text",
                "Most relevant passage, empty if none",
            ))
            .field(Field::number("credibility", 0.0, 1.0, "Source credibility"));
}

impl Generable for SearchQueries {
    fn schema() -> &'static Schema {
        &SEARCH_QUERIES
    }
}

impl Generable for EvidenceAssessment {
    fn schema() -> &'static Schema {
        &EVIDENCE_ASSESSMENT
    }
}

impl FactChecker {
    /// Best-effort evidence for one statement. Never fails: search, fetch
    /// and analysis failures each skip a single query or page.
    ///
    /// Query precedence is `search_queries`, then the statement's suggested
    /// query, then freshly generated queries.
    pub async fn retrieve_evidence(
        &self,
        statement: &VerifiableStatement,
        evidence_count: usize,
        search_queries: Option<&[String]>,
    ) -> Vec<Evidence> {
        if evidence_count == 0 {
            return Vec::new();
        }
        let queries = self.resolve_queries(statement, search_queries).await;

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for query in queries.iter().take(MAX_QUERIES_PER_STATEMENT) {
            match self.search.search(query).await {
                Ok(found) => {
                    for url in found {
                        if seen.insert(url.clone()) {
                            urls.push(url);
                        }
                    }
                }
                Err(e) => warn!(%query, error = %e, "Search failed, trying next query"),
            }
        }

        let mut evidence = Vec::new();
        for url in urls.iter().take(evidence_count * 2) {
            if evidence.len() >= evidence_count {
                break;
            }
            let page = match self.fetcher.fetch(url, self.fetch_timeout).await {
                Ok(page) => page,
                Err(e) => {
                    debug!(%url, error = %e, "Skipping unfetchable page");
                    continue;
                }
            };
            match self.analyze_page(statement, url, &page).await {
                Ok(item) if item.is_informative() => evidence.push(item),
                Ok(_) => debug!(%url, "Discarding uninformative page"),
                Err(e) => warn!(%url, error = %e, "Evidence analysis failed, skipping page"),
            }
        }
        evidence
    }

    async fn resolve_queries(
        &self,
        statement: &VerifiableStatement,
        explicit: Option<&[String]>,
    ) -> Vec<String> {
        let non_blank = |qs: &[String]| -> Vec<String> {
            qs.iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect()
        };

        if let Some(queries) = explicit.map(non_blank).filter(|q| !q.is_empty()) {
            return queries;
        }
        if let Some(ref query) = statement.suggested_query {
            return vec![query.clone()];
        }

        let prompt = EvaluationPrompts::build_search_queries_prompt(statement);
        match self.generator.respond::<SearchQueries>(&prompt).await {
            Ok(generated) => {
                let queries = non_blank(&generated.queries);
                if !queries.is_empty() {
                    return queries;
                }
                vec![statement.text.clone()]
            }
            Err(e) => {
                warn!(statement_id = %statement.id, error = %e, "Query generation failed, searching the statement text");
                vec![statement.text.clone()]
            }
        }
    }

    async fn analyze_page(
        &self,
        statement: &VerifiableStatement,
        url: &str,
        page: &FetchedPage,
    ) -> Result<Evidence, GenerationError> {
        let prompt = EvaluationPrompts::build_evidence_prompt(statement, &page.title, &page.body);
        let assessment: EvidenceAssessment = self.generator.respond(&prompt).await?;
        let source_url = if page.url.is_empty() {
            url
        } else {
            page.url.as_str()
        };
        Ok(Evidence::new(
            source_url,
            page.title.clone(),
            assessment.relevant_text,
            assessment.support_level,
            assessment.credibility,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchloops_llm::testing::ScriptedGenerator;
    use researchloops_web::testing::{StaticFetcher, StaticSearch};
    use serde_json::json;
    use std::sync::Arc;

    use crate::StatementType;

    fn statement(query: Option<&str>) -> VerifiableStatement {
        VerifiableStatement::new("The Eiffel Tower is 330 m tall", StatementType::Numeric, "", 0.9)
            .with_suggested_query(query.map(String::from))
    }

    fn supportive() -> serde_json::Value {
        json!({"support_level": "strong_support", "relevant_text": "330 metres", "credibility": 0.9})
    }

    #[tokio::test]
    async fn test_explicit_queries_take_precedence() {
        let scripted = Arc::new(ScriptedGenerator::new());
        let search = Arc::new(StaticSearch::new(vec![]));
        let checker = FactChecker::new(scripted.clone(), search.clone(), Arc::new(StaticFetcher::new()));

        let explicit = vec!["q1".to_string(), " ".to_string(), "q2".to_string(), "q3".to_string()];
        checker
            .retrieve_evidence(&statement(Some("suggested")), 3, Some(&explicit))
            .await;
        assert_eq!(search.queries(), vec!["q1", "q2"]);
        assert_eq!(scripted.calls_for("SearchQueries"), 0);
    }

    #[tokio::test]
    async fn test_suggested_query_before_generation() {
        let scripted = Arc::new(ScriptedGenerator::new());
        let search = Arc::new(StaticSearch::new(vec![]));
        let checker = FactChecker::new(scripted.clone(), search.clone(), Arc::new(StaticFetcher::new()));

        checker.retrieve_evidence(&statement(Some("eiffel height")), 3, None).await;
        assert_eq!(search.queries(), vec!["eiffel height"]);
        assert_eq!(scripted.calls_for("SearchQueries"), 0);
    }

    #[tokio::test]
    async fn test_generated_queries_as_last_resort() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push("SearchQueries", json!({"queries": ["a", "b", "c"]}));
        let search = Arc::new(StaticSearch::new(vec![]));
        let checker = FactChecker::new(scripted.clone(), search.clone(), Arc::new(StaticFetcher::new()));

        checker.retrieve_evidence(&statement(None), 3, None).await;
        assert_eq!(search.queries(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_search_failure_is_swallowed_and_urls_deduplicated() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.always("EvidenceAssessment", supportive());
        let search = Arc::new(
            StaticSearch::new(vec![])
                .failing_on("q1")
                .with_results("q2", vec!["https://a".into(), "https://a".into(), "https://b".into()]),
        );
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_page("https://a", "A", "330 metres")
                .with_page("https://b", "B", "330 metres"),
        );
        let checker = FactChecker::new(scripted.clone(), search, fetcher.clone());

        let queries = vec!["q1".to_string(), "q2".to_string()];
        let evidence = checker.retrieve_evidence(&statement(None), 5, Some(&queries)).await;
        assert_eq!(evidence.len(), 2);
        assert_eq!(fetcher.fetched(), vec!["https://a", "https://b"]);
    }

    #[tokio::test]
    async fn test_fetch_budget_and_early_stop() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.always("EvidenceAssessment", supportive());
        let urls: Vec<String> = (0..10).map(|i| format!("https://site{}", i)).collect();
        let search = Arc::new(StaticSearch::new(urls));
        // Only the fourth URL resolves; the budget is 2 * 2 = 4 fetches
        let fetcher = Arc::new(StaticFetcher::new().with_page("https://site3", "S3", "body"));
        let checker = FactChecker::new(scripted.clone(), search, fetcher.clone());

        let evidence = checker.retrieve_evidence(&statement(Some("q")), 2, None).await;
        assert_eq!(evidence.len(), 1);
        assert_eq!(fetcher.fetched().len(), 4);

        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.always("EvidenceAssessment", supportive());
        let urls: Vec<String> = (0..10).map(|i| format!("https://site{}", i)).collect();
        let mut fetcher = StaticFetcher::new();
        for url in &urls {
            fetcher = fetcher.with_page(url, "t", "b");
        }
        let fetcher = Arc::new(fetcher);
        let checker = FactChecker::new(scripted, Arc::new(StaticSearch::new(urls)), fetcher.clone());
        let evidence = checker.retrieve_evidence(&statement(Some("q")), 2, None).await;
        assert_eq!(evidence.len(), 2);
        assert_eq!(fetcher.fetched().len(), 2);
    }

    #[tokio::test]
    async fn test_uninformative_and_failed_analyses_are_skipped() {
        let scripted = Arc::new(ScriptedGenerator::new());
        scripted.push(
            "EvidenceAssessment",
            json!({"support_level": "neutral", "relevant_text": "", "credibility": 0.5}),
        );
        scripted.push_failure("EvidenceAssessment", "bad");
        scripted.push(
            "EvidenceAssessment",
            json!({"support_level": "contradict", "relevant_text": "324 m", "credibility": 1.4}),
        );
        let urls: Vec<String> = vec!["https://a".into(), "https://b".into(), "https://c".into()];
        let mut fetcher = StaticFetcher::new();
        for url in &urls {
            fetcher = fetcher.with_page(url, "t", "b");
        }
        let checker = FactChecker::new(scripted, Arc::new(StaticSearch::new(urls)), Arc::new(fetcher));

        let evidence = checker.retrieve_evidence(&statement(Some("q")), 3, None).await;
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].source_url, "https://c");
        assert_eq!(evidence[0].support_level, SupportLevel::Contradict);
        assert_eq!(evidence[0].credibility(), 1.0);
    }
}

//! Wiring shared by the subcommands: generators, web collaborators, the
//! orchestrator and the persisted version history.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;

use researchloops_core::{EvaluationOrchestrator, FactChecker, QualityEvaluator};
use researchloops_db::{Database, VersionRecord};
use researchloops_llm::{AgentConfig, AgentGenerator, AgentKind, StructuredGenerator};
use researchloops_logging::{Logger, ProgressCallback};
use researchloops_tuning::{PromptVersion, VersionManager};
use researchloops_web::{HttpPageFetcher, SerperSearch};

use crate::config::ProjectConfig;

pub struct Runtime {
    pub config: ProjectConfig,
    pub working_dir: PathBuf,
    pub logger: Arc<Logger>,
    pub agent_kind: AgentKind,
    pub model: Option<String>,
    pub json_output: bool,
}

impl Runtime {
    pub fn progress(&self) -> ProgressCallback {
        self.logger.callback()
    }

    /// A fresh CLI-agent generator; every call it makes is its own session
    pub fn generator(&self) -> Arc<dyn StructuredGenerator> {
        let mut agent_config = AgentConfig::new(self.working_dir.clone()).with_timeout(
            self.config
                .agent
                .timeout
                .unwrap_or(self.config.evaluation.operation_timeout),
        );
        if let Some(ref model) = self.model {
            agent_config = agent_config.with_model(model.clone());
        }
        Arc::new(AgentGenerator::new(self.agent_kind, agent_config))
    }

    pub async fn check_generator(&self) -> Result<()> {
        let probe = AgentGenerator::new(self.agent_kind, AgentConfig::new(self.working_dir.clone()));
        if !probe.is_available().await {
            anyhow::bail!(
                "Agent '{}' is not available. Make sure it's installed and in PATH.",
                self.agent_kind
            );
        }
        Ok(())
    }

    pub fn orchestrator(&self) -> Result<EvaluationOrchestrator> {
        let key_env = &self.config.search.api_key_env;
        let api_key = std::env::var(key_env)
            .with_context(|| format!("Set {} to a serper.dev API key", key_env))?;
        let http = Client::builder()
            .user_agent(concat!("researchloops/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let search = SerperSearch::new(http.clone(), api_key, self.config.search.results_per_query);
        let fetcher = HttpPageFetcher::new(http);
        let fact_checker = FactChecker::new(self.generator(), Arc::new(search), Arc::new(fetcher))
            .with_fetch_timeout(self.config.fetch_timeout())
            .with_progress(self.progress());
        let quality = QualityEvaluator::new(self.generator()).with_progress(self.progress());

        Ok(EvaluationOrchestrator::new(quality, fact_checker).with_progress(self.progress()))
    }

    /// Rebuild the in-memory history from the database
    pub fn version_manager(&self, db: &Database) -> Result<VersionManager> {
        let records = db
            .versions()
            .list()
            .context("Failed to read prompt versions")?;
        let versions = records
            .into_iter()
            .map(version_from_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(VersionManager::restore(
            versions,
            self.config.versions.max_versions,
            self.config.evaluation.max_degradation_threshold / 100.0,
        )
        .with_progress(self.progress()))
    }
}

/// Mirror the in-memory history into the database
pub fn persist_versions(db: &Database, versions: &VersionManager) -> Result<()> {
    let records = versions
        .all_versions()
        .iter()
        .map(record_from_version)
        .collect::<Result<Vec<_>>>()?;
    db.versions()
        .replace_all(&records)
        .context("Failed to persist prompt versions")
}

pub fn version_from_record(record: VersionRecord) -> Result<PromptVersion> {
    let value = serde_json::to_value(&record)?;
    serde_json::from_value(value)
        .with_context(|| format!("Stored version {} is malformed", record.version))
}

pub fn record_from_version(version: &PromptVersion) -> Result<VersionRecord> {
    Ok(serde_json::from_value(serde_json::to_value(version)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchloops_tuning::ParameterValue;
    use std::collections::BTreeMap;

    #[test]
    fn test_versions_survive_database_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let manager = VersionManager::new(5, 0.1);
        let mut parameters = BTreeMap::new();
        parameters.insert("depth".to_string(), ParameterValue::Int(3));
        parameters.insert(
            "sources".to_string(),
            ParameterValue::StringArray(vec!["news".into(), "papers".into()]),
        );
        manager.commit(parameters.clone(), 61.5, "deeper planning");
        manager.commit(BTreeMap::new(), 64.0, "empty");

        persist_versions(&db, &manager).unwrap();
        let restored: Vec<PromptVersion> = db
            .versions()
            .list()
            .unwrap()
            .into_iter()
            .map(|r| version_from_record(r).unwrap())
            .collect();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].parameters(), &parameters);
        assert_eq!(restored[0].evaluation_score(), 61.5);
        assert_eq!(restored[1].version(), 2);
    }
}

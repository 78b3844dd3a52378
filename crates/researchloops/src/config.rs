//! Project configuration file support for researchloops.
//!
//! Loads configuration from `researchloops.toml` in the working directory.

use anyhow::{Context, Result};
use researchloops_core::EvaluationConfiguration;
use researchloops_tuning::PromptTemplate;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "researchloops.toml";

/// Project-level configuration loaded from `researchloops.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfiguration,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub search: SearchSection,
    /// External research agent used for A/B validation
    pub research: Option<ResearchSection>,
    #[serde(default)]
    pub versions: VersionsSection,
    #[serde(default)]
    pub templates: Vec<PromptTemplate>,
}

/// The model-backed generator used by every evaluator
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AgentSection {
    /// `claude` or `opencode`
    pub kind: Option<String>,
    pub model: Option<String>,
    /// Per-call limit, e.g. `"2m"`
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSection {
    /// Environment variable holding the Serper.dev API key
    pub api_key_env: String,
    pub results_per_query: usize,
    /// Overrides `evaluation.fetch_timeout`
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Option<Duration>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: "SERPER_API_KEY".to_string(),
            results_per_query: 5,
            fetch_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResearchSection {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionsSection {
    pub max_versions: usize,
}

impl Default for VersionsSection {
    fn default() -> Self {
        Self { max_versions: 50 }
    }
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse or validate (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config
            .evaluation
            .validate()
            .with_context(|| format!("Invalid [evaluation] in {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Fetch timeout with the `[search]` override applied
    pub fn fetch_timeout(&self) -> Duration {
        self.search
            .fetch_timeout
            .unwrap_or(self.evaluation.fetch_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchloops_core::Domain;
    use researchloops_tuning::ParameterValue;

    fn write_config(dir: &Path, content: &str) {
        std::fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_full_config() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[evaluation]
domains_to_use = ["finance", "science"]
personas_per_domain = 1
operation_timeout = "2m"

[agent]
kind = "opencode"
model = "fast-model"
timeout = "90s"

[search]
results_per_query = 3
fetch_timeout = "5s"

[research]
command = "deep-research"
args = ["--quiet"]

[versions]
max_versions = 10

[[templates]]
name = "planner"
body = "Plan {{depth}} levels deep"

[[templates.parameters]]
name = "depth"
type = "int"
default = 2
min = 1
max = 5
"#,
        );

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(
            config.evaluation.domains_to_use,
            vec![Domain::Finance, Domain::Science]
        );
        assert_eq!(config.evaluation.personas_per_domain, 1);
        assert_eq!(config.evaluation.operation_timeout, Duration::from_secs(120));
        assert_eq!(config.agent.kind.as_deref(), Some("opencode"));
        assert_eq!(config.agent.timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.search.api_key_env, "SERPER_API_KEY");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.research.unwrap().args, vec!["--quiet"]);
        assert_eq!(config.versions.max_versions, 10);
        assert_eq!(config.templates.len(), 1);
        assert_eq!(
            config.templates[0].value("depth"),
            Some(&ParameterValue::Int(2))
        );
    }

    #[test]
    fn test_unknown_section_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[critic]\nagent = \"claude\"\n");
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_invalid_evaluation_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[evaluation]\nqualification_threshold = 1.5\n");
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("[evaluation]"));
    }
}

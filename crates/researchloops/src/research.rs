//! Research agent backed by an external command.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use researchloops_core::{EvaluationTask, ResearchAgent, ResearchError, ResearchOutput};
use researchloops_llm::{AgentConfig, ProcessSpawner};

use crate::config::ResearchSection;

/// Environment variable the research command reads its rendered prompt from
pub const INSTRUCTIONS_ENV: &str = "RESEARCHLOOPS_INSTRUCTIONS";

/// Runs `command [args...] <objective>` with the rendered instructions in
/// [`INSTRUCTIONS_ENV`]. Stdout is the markdown answer.
pub struct CliResearchAgent {
    binary: PathBuf,
    args: Vec<String>,
    config: AgentConfig,
}

impl CliResearchAgent {
    pub fn new(section: &ResearchSection, working_dir: PathBuf) -> Self {
        let mut config = AgentConfig::new(working_dir);
        if let Some(timeout) = section.timeout {
            config = config.with_timeout(timeout);
        }
        Self {
            binary: PathBuf::from(&section.command),
            args: section.args.clone(),
            config,
        }
    }
}

#[async_trait]
impl ResearchAgent for CliResearchAgent {
    async fn research(
        &self,
        task: &EvaluationTask,
        instructions: &str,
    ) -> Result<ResearchOutput, ResearchError> {
        let mut args = self.args.clone();
        args.push(task.objective.clone());
        let config = self
            .config
            .clone()
            .with_env(INSTRUCTIONS_ENV.to_string(), instructions.to_string());

        let output = ProcessSpawner::spawn(&self.binary, &args, &config)
            .await
            .map_err(|e| ResearchError(e.to_string()))?;
        if !output.success() {
            return Err(ResearchError(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.exit_code,
                output.stderr_tail(5)
            )));
        }
        if output.trimmed_stdout().is_empty() {
            return Err(ResearchError("research command produced no output".to_string()));
        }

        let sources = extract_urls(&output.stdout);
        debug!(task_id = %task.id, sources = sources.len(), "Research command finished");
        Ok(ResearchOutput::new(output.stdout).with_sources(sources))
    }
}

/// Distinct http(s) URLs in order of first appearance
pub fn extract_urls(markdown: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let separators = |c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>' | '[' | ']' | '"');
    for token in markdown.split(separators) {
        if !(token.starts_with("http://") || token.starts_with("https://")) {
            continue;
        }
        let url = token.trim_end_matches(['.', ',', ';', ':']);
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls_from_markdown() {
        let markdown = "See [the report](https://a.example/report). Also https://b.example/x, \
                        and <https://a.example/report> again.";
        assert_eq!(
            extract_urls(markdown),
            vec!["https://a.example/report", "https://b.example/x"]
        );
    }

    #[test]
    fn test_extract_urls_none() {
        assert!(extract_urls("No links here.").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_agent_passes_objective_and_instructions() {
        let section = ResearchSection {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf '# %s\\n%s\\n' \"$1\" \"$RESEARCHLOOPS_INSTRUCTIONS\"".to_string(),
                "research".to_string(),
            ],
            timeout: None,
        };
        let agent = CliResearchAgent::new(&section, std::env::temp_dir());
        let task = EvaluationTask::from_objective(
            "Lithium prices",
            researchloops_core::Domain::Finance,
        );

        let output = agent.research(&task, "Go 3 levels deep").await.unwrap();
        assert_eq!(output.markdown, "# Lithium prices\nGo 3 levels deep\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_agent_failure_is_research_error() {
        let section = ResearchSection {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string(), "x".to_string()],
            timeout: None,
        };
        let agent = CliResearchAgent::new(&section, std::env::temp_dir());
        let task = EvaluationTask::from_objective("Anything", researchloops_core::Domain::Science);

        let err = agent.research(&task, "").await.unwrap_err();
        assert!(err.0.contains("exited with 3"));
        assert!(err.0.contains("boom"));
    }
}

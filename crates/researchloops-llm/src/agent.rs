use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{extract_json, GenerationError, ProcessSpawner, Schema, StructuredGenerator};

/// Errors that can occur while running a generator agent process
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Agent execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration for agent execution
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Working directory for the agent
    pub working_dir: PathBuf,
    /// Optional timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
    /// Model to use (if agent supports it)
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
            model: None,
        }
    }
}

impl AgentConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Supported agent CLIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    ClaudeCode,
    OpenCode,
}

impl AgentKind {
    fn default_binary(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claude",
            AgentKind::OpenCode => "opencode",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::ClaudeCode => write!(f, "claude-code"),
            AgentKind::OpenCode => write!(f, "opencode"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(AgentKind::ClaudeCode),
            "opencode" | "open-code" => Ok(AgentKind::OpenCode),
            _ => Err(format!("Unknown agent type: {}", s)),
        }
    }
}

/// Structured generator backed by a coding-agent CLI run non-interactively.
///
/// Every call spawns a fresh process, so each call is its own model session.
pub struct AgentGenerator {
    kind: AgentKind,
    binary_path: PathBuf,
    config: AgentConfig,
}

impl AgentGenerator {
    pub fn new(kind: AgentKind, config: AgentConfig) -> Self {
        Self {
            kind,
            binary_path: PathBuf::from(kind.default_binary()),
            config,
        }
    }

    pub fn with_binary_path(mut self, path: PathBuf) -> Self {
        self.binary_path = path;
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Check if the agent CLI is available on the system
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build_args(&self, prompt: String) -> Vec<String> {
        let mut args = Vec::new();
        match self.kind {
            AgentKind::ClaudeCode => {
                args.push("--print".to_string());
                if let Some(ref model) = self.config.model {
                    args.push("--model".to_string());
                    args.push(model.clone());
                }
                // -- keeps prompts starting with '-' from being read as options
                args.push("--".to_string());
                args.push(prompt);
            }
            AgentKind::OpenCode => {
                args.push("run".to_string());
                if let Some(ref model) = self.config.model {
                    args.push("--model".to_string());
                    args.push(model.clone());
                }
                args.push("--prompt".to_string());
                args.push(prompt);
            }
        }
        args
    }
}

#[async_trait]
impl StructuredGenerator for AgentGenerator {
    fn name(&self) -> &str {
        match self.kind {
            AgentKind::ClaudeCode => "Claude Code",
            AgentKind::OpenCode => "OpenCode",
        }
    }

    async fn generate_value(&self, prompt: &str, schema: &Schema) -> Result<Value, GenerationError> {
        let full_prompt = format!("{}\n\n{}", prompt, schema.render_instructions());
        let args = self.build_args(full_prompt);

        let output = ProcessSpawner::spawn(&self.binary_path, &args, &self.config).await?;

        if !output.success() {
            warn!(
                agent = self.name(),
                exit_code = output.exit_code,
                "Generator agent exited with failure"
            );
            return Err(AgentError::ExecutionFailed(format!(
                "exit code {}: {}",
                output.exit_code,
                output.stderr_tail(5)
            ))
            .into());
        }

        let json = extract_json(&output.stdout).ok_or_else(|| {
            GenerationError::Format(format!(
                "no JSON found in {} bytes of output for `{}`",
                output.stdout.len(),
                schema.name
            ))
        })?;

        debug!(schema = schema.name, json_len = json.len(), "Extracted generator JSON");
        serde_json::from_str(json).map_err(|e| GenerationError::Format(e.to_string()))
    }
}

mod config;
mod evaluate;
mod research;
mod runtime;
mod tasks;
mod tune;
mod versions;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use researchloops_llm::AgentKind;
use researchloops_logging::{init_tracing, LogFormat, Logger};

use crate::config::ProjectConfig;
use crate::evaluate::EvaluateArgs;
use crate::runtime::Runtime;
use crate::tune::TuneArgs;
use crate::versions::VersionsAction;

#[derive(Parser, Debug)]
#[command(
    name = "researchloops",
    about = "Evaluation and prompt tuning harness for deep-research agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Agent used for every structured generation call
    #[arg(short, long, value_enum, global = true)]
    agent: Option<AgentChoice>,

    /// Model to use (if agent supports it)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Tracing filter, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also append progress events as JSON lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long, global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate personas and tasks, then keep those that need fresh web research
    Tasks {
        /// Domains to generate for (default: [evaluation].domains_to_use)
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Write qualified tasks and filter statistics as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Score research answers for quality and factual accuracy
    Evaluate(EvaluateArgs),

    /// Analyze an evaluation and adjust prompt parameters
    Tune(TuneArgs),

    /// Inspect or roll back the prompt version history
    Versions {
        #[command(subcommand)]
        action: VersionsAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentChoice {
    Claude,
    Opencode,
}

impl From<AgentChoice> for AgentKind {
    fn from(choice: AgentChoice) -> Self {
        match choice {
            AgentChoice::Claude => AgentKind::ClaudeCode,
            AgentChoice::Opencode => AgentKind::OpenCode,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    // Determine working directory
    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    // CLI flag wins over [agent].kind
    let agent_kind = match (cli.agent, config.agent.kind.as_deref()) {
        (Some(choice), _) => choice.into(),
        (None, Some(kind)) => kind
            .parse::<AgentKind>()
            .map_err(anyhow::Error::msg)
            .context("Invalid [agent].kind")?,
        (None, None) => AgentKind::ClaudeCode,
    };
    let model = cli.model.or_else(|| config.agent.model.clone());

    let logger = match cli.log_file {
        Some(ref path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let rt = Runtime {
        config,
        working_dir,
        logger: Arc::new(logger),
        agent_kind,
        model,
        json_output: cli.json_output,
    };

    match cli.command {
        Command::Tasks { domains, out } => tasks::handle_tasks_command(&rt, domains, out).await,
        Command::Evaluate(args) => evaluate::handle_evaluate_command(&rt, args).await,
        Command::Tune(args) => tune::handle_tune_command(&rt, args).await,
        Command::Versions { action } => versions::handle_versions_command(&rt, action),
    }
}

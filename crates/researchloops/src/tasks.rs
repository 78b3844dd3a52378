use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use researchloops_core::{Domain, EvaluationTask, FilterOutcome, TaskConstructor};

use crate::runtime::Runtime;

pub async fn handle_tasks_command(
    rt: &Runtime,
    domains: Vec<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut config = rt.config.evaluation.clone();
    if !domains.is_empty() {
        config.domains_to_use = domains
            .iter()
            .map(|d| d.parse::<Domain>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
    }
    config.validate().context("Invalid evaluation configuration")?;
    rt.check_generator().await?;

    let constructor = TaskConstructor::new(rt.generator()).with_progress(rt.progress());
    let outcome = constructor
        .construct(&config)
        .await
        .context("Task construction failed")?;

    let json = serde_json::to_string_pretty(&outcome)?;
    match out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !rt.json_output {
                print_summary(&outcome);
                eprintln!("Wrote {}", path.display().to_string().bright_cyan());
            }
        }
        None if rt.json_output => println!("{}", json),
        None => {
            print_summary(&outcome);
            for (i, task) in outcome.qualified.iter().enumerate() {
                println!(
                    "{:>3}  {:<12} {:<12} {}",
                    i,
                    task.persona.domain.as_str(),
                    task.difficulty.to_string(),
                    task.objective
                );
            }
        }
    }
    Ok(())
}

fn print_summary(outcome: &FilterOutcome) {
    let stats = &outcome.statistics;
    eprintln!();
    eprintln!("{}", "=== TASKS ===".bold());
    eprintln!("Candidates: {}", stats.total);
    eprintln!(
        "Stage 1 (recency): {} passed, {} disqualified",
        stats.passed_stage1, stats.disqualified_stage1
    );
    eprintln!(
        "Stage 2 (search necessity): {} passed, {} disqualified",
        stats.passed_stage2, stats.disqualified_stage2
    );
    eprintln!(
        "Qualified: {} ({:.0}%)",
        outcome.qualified.len().to_string().bright_green(),
        stats.qualification_rate() * 100.0
    );
    eprintln!();
}

/// Read tasks written by the `tasks` command, or a plain JSON task array
pub fn load_tasks(path: &Path) -> Result<Vec<EvaluationTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if let Ok(outcome) = serde_json::from_str::<FilterOutcome>(&content) {
        return Ok(outcome.qualified);
    }
    serde_json::from_str::<Vec<EvaluationTask>>(&content)
        .with_context(|| format!("{} holds no tasks", path.display()))
}

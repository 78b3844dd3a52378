use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use researchloops_core::{
    BatchEvaluationResult, BatchInput, Domain, EvaluationResult, EvaluationTask, ResearchOutcome,
    ResearchOutput, Verdict,
};
use researchloops_db::{Database, EvaluationRecord};

use crate::research::extract_urls;
use crate::runtime::Runtime;
use crate::tasks::load_tasks;
use crate::tune;

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Tasks file written by `researchloops tasks`
    #[arg(long)]
    task: Option<PathBuf>,

    /// Index of the task to evaluate in the tasks file
    #[arg(long, requires = "task", conflicts_with = "answers_dir")]
    index: Option<usize>,

    /// Evaluate an ad-hoc objective instead of a task file entry
    #[arg(long, conflicts_with = "task")]
    objective: Option<String>,

    /// Domain of the ad-hoc objective
    #[arg(long, default_value = "technology", requires = "objective")]
    domain: String,

    /// Markdown answer produced by the research agent
    #[arg(long, conflicts_with = "answers_dir")]
    answer: Option<PathBuf>,

    /// Source URLs cited by the answer (default: URLs found in the answer)
    #[arg(long, num_args = 1..)]
    sources: Vec<String>,

    /// Batch mode: the answer for task `i` is `<dir>/<i>.md`
    #[arg(long, requires = "task")]
    answers_dir: Option<PathBuf>,

    /// Write the full result as JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

pub async fn handle_evaluate_command(rt: &Runtime, args: EvaluateArgs) -> Result<()> {
    rt.check_generator().await?;
    let db = Database::open().context("Failed to initialize database")?;

    if let Some(ref dir) = args.answers_dir {
        let task_path = args.task.as_deref().context("--answers-dir needs --task")?;
        return evaluate_batch(rt, &db, task_path, dir, args.out.as_deref()).await;
    }

    let task = resolve_task(&args)?;
    let answer_path = args.answer.as_deref().context("--answer is required")?;
    let output = read_answer(answer_path, args.sources.clone())?;

    let orchestrator = rt.orchestrator()?;
    let result = orchestrator
        .evaluate(&task, &output, &rt.config.evaluation)
        .await;

    db.evaluations()
        .save(&summary_record(&result))
        .context("Failed to save evaluation summary")?;
    write_json(args.out.as_deref(), &result)?;

    if rt.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, rt.config.evaluation.pass_threshold);
    }

    if rt.config.evaluation.auto_tuning_enabled {
        if rt.config.templates.is_empty() {
            eprintln!(
                "{} auto_tuning_enabled is set but no [[templates]] are configured",
                "⚠".bright_yellow()
            );
        } else {
            tune::run_tuning(rt, &db, &result, None, None).await?;
        }
    }
    Ok(())
}

async fn evaluate_batch(
    rt: &Runtime,
    db: &Database,
    task_path: &Path,
    answers_dir: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let tasks = load_tasks(task_path)?;
    let inputs: Vec<BatchInput> = tasks
        .into_iter()
        .enumerate()
        .map(|(i, task)| {
            let path = answers_dir.join(format!("{}.md", i));
            let outcome = match read_answer(&path, Vec::new()) {
                Ok(output) => ResearchOutcome::Completed(output),
                Err(e) => ResearchOutcome::Failed(format!("{:#}", e)),
            };
            BatchInput { task, outcome }
        })
        .collect();

    let orchestrator = rt.orchestrator()?;

    // Handle Ctrl+C gracefully
    let interrupt_handle = orchestrator.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current evaluation...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let batch = orchestrator
        .evaluate_batch(inputs, &rt.config.evaluation)
        .await;

    for result in &batch.results {
        db.evaluations()
            .save(&summary_record(result))
            .context("Failed to save evaluation summary")?;
    }
    write_json(out, &batch)?;

    if rt.json_output {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        print_batch(&batch);
    }
    Ok(())
}

fn resolve_task(args: &EvaluateArgs) -> Result<EvaluationTask> {
    if let Some(ref objective) = args.objective {
        let domain = args
            .domain
            .parse::<Domain>()
            .map_err(anyhow::Error::msg)?;
        return Ok(EvaluationTask::from_objective(objective.clone(), domain));
    }

    let path = args
        .task
        .as_deref()
        .context("Provide --objective, or --task with --index")?;
    let index = args.index.unwrap_or(0);
    let mut tasks = load_tasks(path)?;
    if index >= tasks.len() {
        anyhow::bail!(
            "{} has {} tasks; index {} is out of range",
            path.display(),
            tasks.len(),
            index
        );
    }
    Ok(tasks.swap_remove(index))
}

fn read_answer(path: &Path, sources: Vec<String>) -> Result<ResearchOutput> {
    let markdown = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answer {}", path.display()))?;
    if markdown.trim().is_empty() {
        anyhow::bail!("Answer {} is empty", path.display());
    }
    let sources = if sources.is_empty() {
        extract_urls(&markdown)
    } else {
        sources
    };
    Ok(ResearchOutput::new(markdown).with_sources(sources))
}

fn write_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

pub fn summary_record(result: &EvaluationResult) -> EvaluationRecord {
    EvaluationRecord {
        task_id: result.task.id.to_string(),
        objective: result.task.objective.clone(),
        domain: result.task.persona.domain.as_str().to_string(),
        difficulty: result.task.difficulty.to_string(),
        overall_score: result.overall_score,
        quality_score: result.quality.normalized_score(),
        accuracy: result.fact_check.accuracy,
        created_at: result.completed_at,
    }
}

fn print_result(result: &EvaluationResult, pass_threshold: f64) {
    let overall = format!("{:.1}", result.overall_score);
    let overall = if result.overall_score >= pass_threshold {
        overall.bright_green()
    } else {
        overall.bright_red()
    };

    eprintln!();
    eprintln!("{}", "=== EVALUATION ===".bold());
    eprintln!("Objective: {}", result.task.objective);
    eprintln!(
        "Overall: {} (quality {:.1} x {:.2}, accuracy {:.1} x {:.2})",
        overall,
        result.quality.normalized_score(),
        result.quality_weight,
        result.fact_check.accuracy,
        result.factual_weight
    );
    eprintln!("Duration: {:.1}s", result.duration_secs());
    eprintln!();
    for score in &result.quality.dimension_scores {
        eprintln!(
            "  {:>2}/10  {}{}",
            score.score(),
            score.dimension.name,
            if score.dimension.is_general {
                String::new()
            } else {
                " (task-specific)".dimmed().to_string()
            }
        );
    }
    eprintln!();
    eprintln!("Summary: {}", result.quality.summary);

    let facts = &result.fact_check;
    eprintln!(
        "Facts: {} checked, {} correct, {} incorrect, {} partial, {} unknown, {} errors",
        facts.total_statements,
        facts.correct_count,
        facts.incorrect_count,
        facts.partially_correct_count,
        facts.unknown_count,
        facts.error_count
    );
    for verification in facts
        .verifications
        .iter()
        .filter(|v| v.verdict == Verdict::Incorrect)
    {
        eprintln!("  {} {}", "✗".bright_red(), verification.statement.text);
        if let Some(correction) = verification.correction() {
            eprintln!("    {} {}", "→".dimmed(), correction);
        }
    }
}

fn print_batch(batch: &BatchEvaluationResult) {
    let stats = &batch.statistics;
    eprintln!();
    eprintln!(
        "{}",
        if batch.interrupted {
            "=== BATCH (INTERRUPTED) ===".bright_yellow().bold()
        } else {
            "=== BATCH ===".bold()
        }
    );
    eprintln!(
        "Evaluated: {}   Failed: {}",
        stats.count,
        batch.failures.len()
    );
    eprintln!(
        "Mean: {:.1}   Std dev: {:.1}   Pass rate: {:.0}%",
        stats.mean,
        stats.std_dev,
        stats.pass_rate * 100.0
    );
    for (difficulty, s) in &batch.by_difficulty {
        eprintln!("  {:<14} n={:<3} mean {:.1}", difficulty.to_string(), s.count, s.mean);
    }
    for (domain, s) in &batch.by_domain {
        eprintln!("  {:<14} n={:<3} mean {:.1}", domain.as_str(), s.count, s.mean);
    }
    for failure in &batch.failures {
        eprintln!("  {} {}: {}", "✗".bright_red(), failure.objective, failure.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_answer_extracts_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.md");
        std::fs::write(&path, "Prices fell (https://metals.example/q3).").unwrap();

        let output = read_answer(&path, Vec::new()).unwrap();
        assert_eq!(output.sources, vec!["https://metals.example/q3"]);

        let explicit = read_answer(&path, vec!["https://other.example".into()]).unwrap();
        assert_eq!(explicit.sources, vec!["https://other.example"]);
    }

    #[test]
    fn test_read_answer_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.md");
        std::fs::write(&path, "  \n").unwrap();
        assert!(read_answer(&path, Vec::new()).is_err());
        assert!(read_answer(&dir.path().join("missing.md"), Vec::new()).is_err());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tracing::warn;

use researchloops_core::EvaluationResult;
use researchloops_db::{Database, EvaluationRecord};
use researchloops_tuning::{
    ABValidation, AutoTuneRun, AutoTuner, FeedbackAnalyzer, PromptTemplate, PromptVersion,
    ScoreSnapshot, TuningOutcome,
};

use crate::research::CliResearchAgent;
use crate::runtime::{persist_versions, Runtime};
use crate::tasks::load_tasks;

/// Evaluations fed to the feedback analyzer as recent history
const HISTORY_LEN: usize = 5;

#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Evaluation result JSON written by `researchloops evaluate --out`
    #[arg(long)]
    result: PathBuf,

    /// Tasks to A/B test adjustments on (needs a [research] section)
    #[arg(long)]
    ab_tasks: Option<PathBuf>,

    /// Tasks sampled per A/B test
    #[arg(long, requires = "ab_tasks")]
    sample_size: Option<usize>,

    /// Write the tuning run as JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

pub async fn handle_tune_command(rt: &Runtime, args: TuneArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.result)
        .with_context(|| format!("Failed to read {}", args.result.display()))?;
    let result: EvaluationResult = serde_json::from_str(&content)
        .with_context(|| format!("{} is not an evaluation result", args.result.display()))?;

    rt.check_generator().await?;
    let db = Database::open().context("Failed to initialize database")?;
    let run = run_tuning(rt, &db, &result, args.ab_tasks.as_deref(), args.sample_size).await?;

    if let Some(ref path) = args.out {
        let json = serde_json::to_string_pretty(&run)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if rt.json_output {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }
    Ok(())
}

/// Feedback analysis followed by one auto-tuning step. The version history
/// is read from and written back to the database.
pub async fn run_tuning(
    rt: &Runtime,
    db: &Database,
    result: &EvaluationResult,
    ab_tasks: Option<&Path>,
    sample_size: Option<usize>,
) -> Result<AutoTuneRun> {
    if rt.config.templates.is_empty() {
        anyhow::bail!("No [[templates]] configured; nothing to tune");
    }
    let config = &rt.config.evaluation;
    let versions = Arc::new(rt.version_manager(db)?);

    if let Some(current) = versions.current() {
        if versions.rollback_if_worse(result.overall_score, current.evaluation_score()) {
            persist_versions(db, &versions)?;
            eprintln!(
                "{} Score {:.1} fell too far below version {} ({:.1}); rolled back",
                "↩".bright_yellow(),
                result.overall_score,
                current.version(),
                current.evaluation_score()
            );
        }
    }

    let mut templates = rt.config.templates.clone();
    if let Some(current) = versions.current() {
        apply_version(&mut templates, &current);
    }

    let history = recent_history(db, &result.task.id.to_string(), result.completed_at)?;
    let feedback = FeedbackAnalyzer::new(rt.generator())
        .with_progress(rt.progress())
        .analyze(result, &history)
        .await
        .context("Feedback analysis failed")?;

    let mut tuner = AutoTuner::new(
        rt.generator(),
        config.min_improvement_threshold,
        config.max_degradation_threshold,
    )
    .with_versions(versions.clone())
    .with_progress(rt.progress());

    let test_cases = match ab_tasks {
        Some(path) => {
            let research = rt
                .config
                .research
                .as_ref()
                .context("A/B validation needs a [research] section in researchloops.toml")?;
            let agent = Arc::new(CliResearchAgent::new(research, rt.working_dir.clone()));
            let mut validation =
                ABValidation::enabled(Arc::new(rt.orchestrator()?), agent, config.clone());
            if let (Some(n), ABValidation::Enabled { sample_size, .. }) =
                (sample_size, &mut validation)
            {
                *sample_size = n;
            }
            tuner = tuner.with_validation(validation);
            Some(load_tasks(path)?)
        }
        None => None,
    };

    let run = tuner.run(&feedback, &templates, test_cases.as_deref()).await;
    persist_versions(db, &versions)?;

    if !rt.json_output {
        print_run(&run);
    }
    Ok(run)
}

/// Load the stored parameter values of a version into the templates that
/// declare them
pub fn apply_version(templates: &mut [PromptTemplate], version: &PromptVersion) {
    for (name, value) in version.parameters() {
        for template in templates.iter_mut().filter(|t| t.contains(name)) {
            if let Err(e) = template.set_value(name, value.clone()) {
                warn!(
                    version = version.version(),
                    template = %template.name,
                    error = %e,
                    "Stored parameter no longer fits its template"
                );
            }
        }
    }
}

/// The latest stored evaluations, oldest first, minus the one being tuned on
fn recent_history(
    db: &Database,
    task_id: &str,
    completed_at: DateTime<Utc>,
) -> Result<Vec<ScoreSnapshot>> {
    let records = db
        .evaluations()
        .recent(HISTORY_LEN + 1)
        .context("Failed to read evaluation history")?;
    let mut history: Vec<ScoreSnapshot> = records
        .iter()
        .filter(|r| !(r.task_id == task_id && r.created_at == completed_at))
        .map(snapshot_from_record)
        .collect();
    if history.len() > HISTORY_LEN {
        history.drain(..history.len() - HISTORY_LEN);
    }
    Ok(history)
}

fn snapshot_from_record(record: &EvaluationRecord) -> ScoreSnapshot {
    ScoreSnapshot {
        overall_score: record.overall_score,
        quality_score: record.quality_score,
        accuracy: record.accuracy,
        recorded_at: record.created_at,
    }
}

fn print_run(run: &AutoTuneRun) {
    eprintln!();
    let header = match run.result {
        TuningOutcome::Improved => "=== IMPROVED ===".bright_green().bold(),
        TuningOutcome::NoChange { .. } => "=== NO CHANGE ===".bold(),
        TuningOutcome::Rollback { .. } => "=== ROLLBACK ===".bright_red().bold(),
    };
    eprintln!("{}", header);
    if !run.result.reason().is_empty() {
        eprintln!("{}", run.result.reason());
    }

    for adjustment in &run.adjustments {
        let old = adjustment
            .old_value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "  {}: {} → {}",
            adjustment.parameter_name.bright_cyan(),
            old,
            adjustment.new_value
        );
        eprintln!("    {}", adjustment.reason.dimmed());
    }

    for ab in &run.ab_test_results {
        eprintln!(
            "  A/B {}: {:.1} vs {:.1} ({:+.1}%, p = {:.3}){}",
            ab.configuration.parameter_name,
            ab.baseline_mean,
            ab.variant_mean,
            ab.improvement_percentage,
            ab.p_value,
            if ab.should_accept { " accepted" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use researchloops_tuning::{ParameterType, ParameterValue, PromptParameter, VersionManager};
    use std::collections::BTreeMap;

    fn planner() -> PromptTemplate {
        PromptTemplate::new(
            "planner",
            "Research {{depth}} levels deep",
            vec![PromptParameter::new("depth", ParameterType::Int, ParameterValue::Int(2))
                .with_bounds(1.0, 6.0)],
        )
    }

    #[test]
    fn test_apply_version_sets_declared_parameters() {
        let manager = VersionManager::new(5, 0.1);
        let mut parameters = BTreeMap::new();
        parameters.insert("depth".to_string(), ParameterValue::Int(4));
        parameters.insert("tone".to_string(), ParameterValue::String("formal".into()));
        let version = manager.commit(parameters, 70.0, "deeper");

        let mut templates = vec![planner()];
        apply_version(&mut templates, &version);
        assert_eq!(templates[0].value("depth"), Some(&ParameterValue::Int(4)));
        assert_eq!(templates[0].render(), "Research 4 levels deep");
    }

    #[test]
    fn test_apply_version_skips_values_that_no_longer_fit() {
        let manager = VersionManager::new(5, 0.1);
        let mut parameters = BTreeMap::new();
        parameters.insert("depth".to_string(), ParameterValue::String("deep".into()));
        let version = manager.commit(parameters, 70.0, "bad type");

        let mut templates = vec![planner()];
        apply_version(&mut templates, &version);
        assert_eq!(templates[0].value("depth"), Some(&ParameterValue::Int(2)));
    }

    #[test]
    fn test_recent_history_excludes_current_result() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        for i in 0..7 {
            db.evaluations()
                .save(&EvaluationRecord {
                    task_id: format!("old-{}", i),
                    objective: "Earlier question".to_string(),
                    domain: "science".to_string(),
                    difficulty: "basic".to_string(),
                    overall_score: 50.0 + i as f64,
                    quality_score: 60.0,
                    accuracy: 40.0,
                    created_at: now - Duration::minutes(10 - i),
                })
                .unwrap();
        }

        let history = recent_history(&db, "old-6", now - Duration::minutes(4)).unwrap();
        let scores: Vec<f64> = history.iter().map(|s| s.overall_score).collect();
        assert_eq!(scores, vec![51.0, 52.0, 53.0, 54.0, 55.0]);

        let unrelated = recent_history(&db, "other", now).unwrap();
        assert_eq!(unrelated.len(), HISTORY_LEN);
        assert_eq!(unrelated[0].overall_score, 52.0);
    }
}

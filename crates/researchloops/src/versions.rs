use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use researchloops_db::{Database, EvaluationFilter};
use researchloops_tuning::PromptVersion;

use crate::runtime::{persist_versions, version_from_record, Runtime};

/// Versions considered when reporting the score trend
const TREND_WINDOW: usize = 5;

#[derive(Subcommand, Debug)]
pub enum VersionsAction {
    /// List the stored prompt versions
    List,

    /// Show the parameters of one version
    Show {
        /// Version number
        version: u64,
    },

    /// Drop every version after the given one
    Rollback {
        /// Version to keep as the head
        version: u64,
    },

    /// Drop the latest version
    Previous,

    /// List recorded evaluation scores
    History {
        /// Only evaluations in this domain
        #[arg(long)]
        domain: Option<String>,

        /// Maximum number of rows
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn handle_versions_command(rt: &Runtime, action: VersionsAction) -> Result<()> {
    let db = Database::open().context("Failed to initialize database")?;

    match action {
        VersionsAction::List => {
            let manager = rt.version_manager(&db)?;
            let versions = manager.all_versions();
            if rt.json_output {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else if versions.is_empty() {
                println!("{}", "No prompt versions yet.".dimmed());
            } else {
                print_versions_table(&versions);
                println!();
                if let Some(best) = manager.best_version() {
                    println!(
                        "{}  v{} ({:.1})",
                        "Best:".dimmed(),
                        best.version(),
                        best.evaluation_score()
                    );
                }
                println!(
                    "{}  {:+.2} per version over the last {}",
                    "Trend:".dimmed(),
                    manager.score_trend(TREND_WINDOW),
                    TREND_WINDOW
                );
            }
        }
        VersionsAction::Show { version } => {
            let record = db
                .versions()
                .get(version)
                .context("Failed to read prompt versions")?
                .with_context(|| format!("Version {} not found", version))?;
            let version = version_from_record(record)?;
            if rt.json_output {
                println!("{}", serde_json::to_string_pretty(&version)?);
            } else {
                print_version_detail(&version);
            }
        }
        VersionsAction::Rollback { version } => {
            let manager = rt.version_manager(&db)?;
            let head = manager
                .rollback(version)
                .with_context(|| format!("Version {} not found", version))?;
            let removed = db
                .versions()
                .delete_after(head.version())
                .context("Failed to persist rollback")?;
            println!(
                "{} Rolled back to v{} ({} newer version(s) removed)",
                "↩".bright_yellow(),
                head.version(),
                removed
            );
        }
        VersionsAction::Previous => {
            let manager = rt.version_manager(&db)?;
            let head = manager
                .rollback_to_previous()
                .context("Need at least two versions to roll back")?;
            persist_versions(&db, &manager)?;
            println!(
                "{} Rolled back to v{} ({:.1})",
                "↩".bright_yellow(),
                head.version(),
                head.evaluation_score()
            );
        }
        VersionsAction::History { domain, limit } => {
            let filter = EvaluationFilter {
                domain,
                limit: Some(limit),
            };
            let records = db
                .evaluations()
                .list(&filter)
                .context("Failed to read evaluation history")?;
            if rt.json_output {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("{}", "No evaluations recorded.".dimmed());
            } else {
                let total = db.evaluations().count()?;
                println!(
                    "{:<17} {:<12} {:>7} {:>7} {:>7}  {}",
                    "TIMESTAMP".dimmed(),
                    "DOMAIN".dimmed(),
                    "OVERALL".dimmed(),
                    "QUALITY".dimmed(),
                    "FACTS".dimmed(),
                    "OBJECTIVE".dimmed(),
                );
                for r in &records {
                    println!(
                        "{:<17} {:<12} {:>7.1} {:>7.1} {:>7.1}  {}",
                        r.created_at.format("%Y-%m-%d %H:%M"),
                        r.domain,
                        r.overall_score,
                        r.quality_score,
                        r.accuracy,
                        preview(&r.objective, 60)
                    );
                }
                println!();
                println!("{}", format!("{} of {} shown", records.len(), total).dimmed());
            }
        }
    }

    Ok(())
}

fn print_versions_table(versions: &[PromptVersion]) {
    println!(
        "{:<6} {:<17} {:>7}  {}",
        "VER".dimmed(),
        "CREATED".dimmed(),
        "SCORE".dimmed(),
        "DESCRIPTION".dimmed(),
    );
    let last = versions.last().map(|v| v.version());
    for v in versions {
        let marker = if Some(v.version()) == last {
            format!("v{}*", v.version()).bright_cyan().to_string()
        } else {
            format!("v{}", v.version())
        };
        println!(
            "{:<6} {:<17} {:>7.1}  {}",
            marker,
            v.created_at().format("%Y-%m-%d %H:%M"),
            v.evaluation_score(),
            preview(v.description(), 60)
        );
    }
}

fn print_version_detail(version: &PromptVersion) {
    println!(
        "{}",
        format!("=== Version {} ===", version.version()).bright_blue().bold()
    );
    println!(
        "{}  {}",
        "Created:".dimmed(),
        version.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}  {:.1}", "Score:".dimmed(), version.evaluation_score());
    println!("{}  {}", "Description:".dimmed(), version.description());
    if !version.parameters().is_empty() {
        println!();
        println!("{}", "Parameters:".dimmed());
        for (name, value) in version.parameters() {
            println!("  {} = {}", name.bright_cyan(), value);
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("Ünïcödé text", 5), "Ünïcö...");
    }
}

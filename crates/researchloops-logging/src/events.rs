use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Callback through which pipeline components report progress
pub type ProgressCallback = Arc<dyn Fn(&EvaluationProgress) + Send + Sync>;

/// Progress events emitted by the evaluation and tuning pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EvaluationProgress {
    PersonasGenerated {
        domain: String,
        count: usize,
    },
    TasksGenerated {
        persona: String,
        count: usize,
    },
    QualificationStarted {
        total_tasks: usize,
    },
    TaskQualified {
        task_id: String,
        necessity_score: f64,
    },
    TaskDisqualified {
        task_id: String,
        stage: u8,
        reason: String,
    },
    QualificationCompleted {
        qualified: usize,
        disqualified: usize,
        qualification_rate: f64,
    },
    EvaluationStarted {
        task_id: String,
        objective: String,
    },
    DimensionsGenerated {
        general: usize,
        task_specific: usize,
    },
    DimensionScored {
        dimension: String,
        score: u8,
    },
    QualityCompleted {
        weighted_average: f64,
        normalized_score: f64,
    },
    StatementsExtracted {
        count: usize,
    },
    EvidenceRetrieved {
        statement_id: String,
        evidence_count: usize,
    },
    StatementVerified {
        statement_id: String,
        verdict: String,
        confidence: f64,
    },
    FactCheckCompleted {
        total_statements: usize,
        accuracy: f64,
    },
    EvaluationCompleted {
        task_id: String,
        overall_score: f64,
        duration_secs: f64,
    },
    BatchCompleted {
        evaluated: usize,
        failed: usize,
        mean_score: f64,
    },
    FeedbackAnalyzed {
        weaknesses: usize,
        priority_actions: usize,
    },
    AdjustmentsProposed {
        count: usize,
    },
    #[serde(rename = "ab_test_completed")]
    ABTestCompleted {
        parameter: String,
        improvement_percentage: f64,
        p_value: f64,
        accepted: bool,
    },
    TuningDecided {
        decision: String,
        reason: String,
    },
    VersionCommitted {
        version: u64,
        score: f64,
    },
    VersionRolledBack {
        version: u64,
    },
}

impl EvaluationProgress {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for pipeline events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    /// A progress callback that forwards to this logger
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let logger = Arc::clone(self);
        Arc::new(move |event: &EvaluationProgress| logger.log(event))
    }

    pub fn log(&self, event: &EvaluationProgress) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        let line = match self.format {
            LogFormat::Json => serde_json::to_string(event).ok(),
            LogFormat::Pretty => Self::render_pretty(event),
            LogFormat::Compact => Some(Self::render_compact(event)),
        };
        if let Some(line) = line {
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
    }

    fn render_pretty(event: &EvaluationProgress) -> Option<String> {
        let line = match event {
            EvaluationProgress::PersonasGenerated { domain, count } => format!(
                "{} {} personas for {}",
                "◆".bright_blue(),
                count,
                domain.bold()
            ),
            EvaluationProgress::TasksGenerated { persona, count } => format!(
                "  {} {} tasks for {}",
                "▶".bright_cyan(),
                count,
                persona.dimmed()
            ),
            EvaluationProgress::QualificationStarted { total_tasks } => format!(
                "{} Qualifying {} tasks",
                "◆".bright_blue(),
                total_tasks
            ),
            EvaluationProgress::TaskQualified {
                task_id,
                necessity_score,
            } => format!(
                "    {} {} (necessity {:.2})",
                "✓".bright_green(),
                short_id(task_id),
                necessity_score
            ),
            EvaluationProgress::TaskDisqualified {
                task_id,
                stage,
                reason,
            } => format!(
                "    {} {} stage {}: {}",
                "✗".bright_red(),
                short_id(task_id),
                stage,
                truncate(reason, 80).dimmed()
            ),
            EvaluationProgress::QualificationCompleted {
                qualified,
                disqualified,
                qualification_rate,
            } => format!(
                "{} Qualified {} / {} ({:.0}%)",
                "◆".bright_blue(),
                qualified,
                qualified + disqualified,
                qualification_rate * 100.0
            ),
            EvaluationProgress::EvaluationStarted { objective, .. } => {
                let rule = "─".repeat(67);
                format!(
                    "{}\n{} {}",
                    rule.bright_blue(),
                    "EVALUATING".bright_cyan().bold(),
                    truncate(objective, 60)
                )
            }
            EvaluationProgress::DimensionsGenerated {
                general,
                task_specific,
            } => format!(
                "  {} {} general + {} task-specific dimensions",
                "▶".bright_cyan(),
                general,
                task_specific
            ),
            EvaluationProgress::DimensionScored { dimension, score } => {
                let score_text = format!("{}/10", score);
                let styled = if *score >= 7 {
                    score_text.bright_green()
                } else if *score <= 5 {
                    score_text.bright_red()
                } else {
                    score_text.bright_yellow()
                };
                format!("    {} {}", styled, dimension)
            }
            EvaluationProgress::QualityCompleted {
                weighted_average,
                normalized_score,
            } => format!(
                "  {} Quality {:.2}/10 ({:.1})",
                "✓".bright_green(),
                weighted_average,
                normalized_score
            ),
            EvaluationProgress::StatementsExtracted { count } => format!(
                "  {} {} verifiable statements",
                "▶".bright_magenta(),
                count
            ),
            EvaluationProgress::EvidenceRetrieved { .. } => return None,
            EvaluationProgress::StatementVerified {
                statement_id,
                verdict,
                confidence,
            } => format!(
                "    {} {} ({:.0}%) {}",
                "│".dimmed(),
                verdict,
                confidence * 100.0,
                short_id(statement_id).dimmed()
            ),
            EvaluationProgress::FactCheckCompleted {
                total_statements,
                accuracy,
            } => format!(
                "  {} Accuracy {:.1}% over {} statements",
                "✓".bright_green(),
                accuracy,
                total_statements
            ),
            EvaluationProgress::EvaluationCompleted {
                overall_score,
                duration_secs,
                ..
            } => format!(
                "{} Overall {} ({:.1}s)",
                "◆".bright_blue(),
                format!("{:.1}", overall_score).bold(),
                duration_secs
            ),
            EvaluationProgress::BatchCompleted {
                evaluated,
                failed,
                mean_score,
            } => format!(
                "{} Batch: {} evaluated, {} failed, mean {:.1}",
                "◆".bright_blue(),
                evaluated,
                failed,
                mean_score
            ),
            EvaluationProgress::FeedbackAnalyzed {
                weaknesses,
                priority_actions,
            } => format!(
                "{} {} weaknesses, {} priority actions",
                "◆".bright_yellow(),
                weaknesses,
                priority_actions
            ),
            EvaluationProgress::AdjustmentsProposed { count } => format!(
                "  {} {} parameter adjustments",
                "▶".bright_yellow(),
                count
            ),
            EvaluationProgress::ABTestCompleted {
                parameter,
                improvement_percentage,
                p_value,
                accepted,
            } => format!(
                "  {} A/B {}: {:+.1}% (p={:.3})",
                if *accepted {
                    "✓".bright_green()
                } else {
                    "✗".bright_red()
                },
                parameter,
                improvement_percentage,
                p_value
            ),
            EvaluationProgress::TuningDecided { decision, reason } => {
                let styled = match decision.as_str() {
                    "improved" => decision.bright_green(),
                    "rollback" => decision.bright_red(),
                    _ => decision.bright_yellow(),
                };
                format!("{} Tuning: {} ({})", "◆".bright_yellow(), styled, reason)
            }
            EvaluationProgress::VersionCommitted { version, score } => format!(
                "  {} Committed v{} (score {:.1})",
                "✓".bright_green(),
                version,
                score
            ),
            EvaluationProgress::VersionRolledBack { version } => format!(
                "  {} Rolled back to v{}",
                "⚠".bright_yellow(),
                version
            ),
        };
        Some(line)
    }

    fn render_compact(event: &EvaluationProgress) -> String {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            EvaluationProgress::PersonasGenerated { domain, count } => {
                format!("personas:{}:{}", domain, count)
            }
            EvaluationProgress::TasksGenerated { count, .. } => format!("tasks:{}", count),
            EvaluationProgress::QualificationStarted { total_tasks } => {
                format!("qualify:start:{}", total_tasks)
            }
            EvaluationProgress::TaskQualified { task_id, .. } => {
                format!("qualify:pass:{}", short_id(task_id))
            }
            EvaluationProgress::TaskDisqualified { task_id, stage, .. } => {
                format!("qualify:fail:{}:stage{}", short_id(task_id), stage)
            }
            EvaluationProgress::QualificationCompleted {
                qualified,
                disqualified,
                ..
            } => format!("qualify:done:{}/{}", qualified, qualified + disqualified),
            EvaluationProgress::EvaluationStarted { task_id, .. } => {
                format!("eval:start:{}", short_id(task_id))
            }
            EvaluationProgress::DimensionsGenerated {
                general,
                task_specific,
            } => format!("quality:dims:{}+{}", general, task_specific),
            EvaluationProgress::DimensionScored { dimension, score } => {
                format!("quality:score:{}={}", dimension, score)
            }
            EvaluationProgress::QualityCompleted {
                normalized_score, ..
            } => format!("quality:done:{:.1}", normalized_score),
            EvaluationProgress::StatementsExtracted { count } => format!("facts:extracted:{}", count),
            EvaluationProgress::EvidenceRetrieved {
                statement_id,
                evidence_count,
            } => format!("facts:evidence:{}:{}", short_id(statement_id), evidence_count),
            EvaluationProgress::StatementVerified {
                statement_id,
                verdict,
                ..
            } => format!("facts:verdict:{}:{}", short_id(statement_id), verdict),
            EvaluationProgress::FactCheckCompleted { accuracy, .. } => {
                format!("facts:done:{:.1}", accuracy)
            }
            EvaluationProgress::EvaluationCompleted {
                task_id,
                overall_score,
                duration_secs,
            } => format!(
                "eval:done:{} {:.1} {:.1}s",
                short_id(task_id),
                overall_score,
                duration_secs
            ),
            EvaluationProgress::BatchCompleted {
                evaluated, failed, ..
            } => format!("batch:done:{}:{}", evaluated, failed),
            EvaluationProgress::FeedbackAnalyzed {
                weaknesses,
                priority_actions,
            } => format!("feedback:{}:{}", weaknesses, priority_actions),
            EvaluationProgress::AdjustmentsProposed { count } => format!("tune:adjust:{}", count),
            EvaluationProgress::ABTestCompleted {
                parameter,
                accepted,
                ..
            } => format!("tune:ab:{}:{}", parameter, accepted),
            EvaluationProgress::TuningDecided { decision, .. } => format!("tune:{}", decision),
            EvaluationProgress::VersionCommitted { version, .. } => {
                format!("version:commit:{}", version)
            }
            EvaluationProgress::VersionRolledBack { version } => {
                format!("version:rollback:{}", version)
            }
        };
        format!("[{}] {}", timestamp, msg)
    }
}

fn short_id(id: &str) -> &str {
    let end = id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = EvaluationProgress::StatementVerified {
            statement_id: "abc".to_string(),
            verdict: "correct".to_string(),
            confidence: 0.9,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "statement_verified");
        assert_eq!(json["verdict"], "correct");

        let ab = EvaluationProgress::ABTestCompleted {
            parameter: "depth".to_string(),
            improvement_percentage: 3.0,
            p_value: 0.2,
            accepted: false,
        };
        assert_eq!(serde_json::to_value(&ab).unwrap()["event"], "ab_test_completed");
    }

    #[test]
    fn test_file_logging_appends_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap();

        logger.log(&EvaluationProgress::StatementsExtracted { count: 3 });
        logger.log(&EvaluationProgress::VersionRolledBack { version: 2 });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "statements_extracted");
        assert!(first.get("timestamp").is_some());
    }

    #[test]
    fn test_callback_forwards_to_logger() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = Arc::new(Logger::with_file(LogFormat::Json, &path).unwrap());
        let callback = logger.callback();

        callback(&EvaluationProgress::AdjustmentsProposed { count: 1 });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("adjustments_proposed"));
    }

    #[test]
    fn test_short_id_and_truncate() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

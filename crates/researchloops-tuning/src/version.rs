use chrono::{DateTime, Utc};
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::ParameterValue;

pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Immutable snapshot of tuned parameters. Only [`VersionManager::commit`]
/// creates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    version: u64,
    created_at: DateTime<Utc>,
    parameters: BTreeMap<String, ParameterValue>,
    evaluation_score: f64,
    description: String,
}

impl PromptVersion {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParameterValue> {
        &self.parameters
    }

    pub fn evaluation_score(&self) -> f64 {
        self.evaluation_score
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

struct History {
    versions: Vec<PromptVersion>,
    next_version: u64,
}

/// Size-bounded version history with manual and score-based rollback.
///
/// All mutations happen under one lock. Reads clone a consistent snapshot.
pub struct VersionManager {
    history: Mutex<History>,
    max_versions: usize,
    /// Relative degradation (0.1 = 10%) that triggers [`rollback_if_worse`]
    ///
    /// [`rollback_if_worse`]: VersionManager::rollback_if_worse
    degradation_threshold: f64,
    progress: Option<ProgressCallback>,
}

impl VersionManager {
    pub fn new(max_versions: usize, degradation_threshold: f64) -> Self {
        Self::restore(Vec::new(), max_versions, degradation_threshold)
    }

    /// Rebuild a manager from persisted versions. Numbering continues after
    /// the highest restored version.
    pub fn restore(
        mut versions: Vec<PromptVersion>,
        max_versions: usize,
        degradation_threshold: f64,
    ) -> Self {
        let max_versions = max_versions.max(1);
        versions.sort_by_key(|v| v.version);
        versions.dedup_by_key(|v| v.version);
        if versions.len() > max_versions {
            versions.drain(..versions.len() - max_versions);
        }
        let next_version = versions.last().map(|v| v.version + 1).unwrap_or(1);
        Self {
            history: Mutex::new(History {
                versions,
                next_version,
            }),
            max_versions,
            degradation_threshold: degradation_threshold.max(0.0),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Version history lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn emit(&self, event: EvaluationProgress) {
        if let Some(ref progress) = self.progress {
            progress(&event);
        }
    }

    pub fn commit(
        &self,
        parameters: BTreeMap<String, ParameterValue>,
        evaluation_score: f64,
        description: impl Into<String>,
    ) -> PromptVersion {
        let version = {
            let mut history = self.lock();
            let version = PromptVersion {
                version: history.next_version,
                created_at: Utc::now(),
                parameters,
                evaluation_score,
                description: description.into(),
            };
            history.next_version += 1;
            history.versions.push(version.clone());
            let excess = history.versions.len().saturating_sub(self.max_versions);
            if excess > 0 {
                history.versions.drain(..excess);
            }
            version
        };

        info!(version = version.version, score = evaluation_score, "Committed prompt version");
        self.emit(EvaluationProgress::VersionCommitted {
            version: version.version,
            score: evaluation_score,
        });
        version
    }

    /// Drop every version after `to`. Returns the new head, or `None` (and
    /// changes nothing) when `to` is not in the history.
    pub fn rollback(&self, to: u64) -> Option<PromptVersion> {
        let head = {
            let mut history = self.lock();
            let index = history.versions.iter().position(|v| v.version == to)?;
            history.versions.truncate(index + 1);
            history.versions.last().cloned()
        };
        if let Some(ref head) = head {
            info!(version = head.version, "Rolled back prompt version");
            self.emit(EvaluationProgress::VersionRolledBack {
                version: head.version,
            });
        }
        head
    }

    /// Remove the latest version. Needs at least two versions.
    pub fn rollback_to_previous(&self) -> Option<PromptVersion> {
        let head = {
            let mut history = self.lock();
            if history.versions.len() < 2 {
                return None;
            }
            history.versions.pop();
            history.versions.last().cloned()
        };
        if let Some(ref head) = head {
            info!(version = head.version, "Rolled back to previous prompt version");
            self.emit(EvaluationProgress::VersionRolledBack {
                version: head.version,
            });
        }
        head
    }

    /// Roll back to the previous version when `new_score` degrades on
    /// `previous_score` by more than the threshold. Returns whether a
    /// rollback happened.
    pub fn rollback_if_worse(&self, new_score: f64, previous_score: f64) -> bool {
        if previous_score <= 0.0 {
            return false;
        }
        let degradation = (previous_score - new_score) / previous_score;
        if degradation > self.degradation_threshold {
            warn!(
                degradation = format!("{:.1}%", degradation * 100.0),
                "Score degraded past threshold"
            );
            self.rollback_to_previous().is_some()
        } else {
            false
        }
    }

    pub fn best_version(&self) -> Option<PromptVersion> {
        self.lock()
            .versions
            .iter()
            .max_by(|a, b| a.evaluation_score.total_cmp(&b.evaluation_score))
            .cloned()
    }

    /// Average score change between consecutive versions among the last
    /// `last_n`. Zero with fewer than two versions in the window.
    pub fn score_trend(&self, last_n: usize) -> f64 {
        let history = self.lock();
        let start = history.versions.len().saturating_sub(last_n);
        let window = &history.versions[start..];
        if window.len() < 2 {
            return 0.0;
        }
        let total: f64 = window
            .windows(2)
            .map(|pair| pair[1].evaluation_score - pair[0].evaluation_score)
            .sum();
        total / (window.len() - 1) as f64
    }

    pub fn version(&self, number: u64) -> Option<PromptVersion> {
        self.lock()
            .versions
            .iter()
            .find(|v| v.version == number)
            .cloned()
    }

    pub fn current(&self) -> Option<PromptVersion> {
        self.lock().versions.last().cloned()
    }

    pub fn all_versions(&self) -> Vec<PromptVersion> {
        self.lock().versions.clone()
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VERSIONS, 0.1)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{clamp_unit, Domain, ExpertiseLevel, Persona};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStatus {
    #[default]
    Pending,
    Qualified,
    Disqualified,
}

/// Which qualification stage rejected a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStage {
    /// Stage 1: does the task need current information
    Recency,
    /// Stage 2: does web search materially improve the answer
    SearchNecessity,
}

impl QualificationStage {
    pub fn number(&self) -> u8 {
        match self {
            QualificationStage::Recency => 1,
            QualificationStage::SearchNecessity => 2,
        }
    }
}

/// A research question evaluated end to end.
///
/// The qualification fields are written only by the two-stage filter while
/// the task is still pending; once qualified or disqualified they are frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub id: Uuid,
    pub persona: Persona,
    pub objective: String,
    pub requirements: Vec<String>,
    pub expected_format: String,
    pub difficulty: Difficulty,
    requires_recent_info: bool,
    search_necessity_score: Option<f64>,
    #[serde(default)]
    qualification_status: QualificationStatus,
    disqualification_reason: Option<String>,
    #[serde(default)]
    disqualification_stage: Option<QualificationStage>,
}

impl EvaluationTask {
    pub fn new(
        persona: Persona,
        objective: impl Into<String>,
        requirements: Vec<String>,
        expected_format: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona,
            objective: objective.into(),
            requirements,
            expected_format: expected_format.into(),
            difficulty,
            requires_recent_info: false,
            search_necessity_score: None,
            qualification_status: QualificationStatus::Pending,
            disqualification_reason: None,
            disqualification_stage: None,
        }
    }

    /// Ad-hoc task for evaluating an answer to a free-form objective
    pub fn from_objective(objective: impl Into<String>, domain: Domain) -> Self {
        let persona = Persona::new(
            "Ad-hoc requester",
            domain,
            "General researcher",
            ExpertiseLevel::Intermediate,
        );
        Self::new(
            persona,
            objective,
            Vec::new(),
            "Markdown report",
            Difficulty::Intermediate,
        )
    }

    pub fn requires_recent_info(&self) -> bool {
        self.requires_recent_info
    }

    pub fn search_necessity_score(&self) -> Option<f64> {
        self.search_necessity_score
    }

    pub fn qualification_status(&self) -> QualificationStatus {
        self.qualification_status
    }

    pub fn disqualification_reason(&self) -> Option<&str> {
        self.disqualification_reason.as_deref()
    }

    pub fn disqualification_stage(&self) -> Option<QualificationStage> {
        self.disqualification_stage
    }

    pub fn is_pending(&self) -> bool {
        self.qualification_status == QualificationStatus::Pending
    }

    pub(crate) fn record_recency(&mut self, requires_recent_info: bool) {
        if self.is_pending() {
            self.requires_recent_info = requires_recent_info;
        }
    }

    pub(crate) fn record_necessity(&mut self, score: f64) {
        if self.is_pending() {
            self.search_necessity_score = Some(clamp_unit(score));
        }
    }

    pub(crate) fn qualify(&mut self) {
        if self.is_pending() {
            self.qualification_status = QualificationStatus::Qualified;
        }
    }

    pub(crate) fn disqualify(&mut self, stage: QualificationStage, reason: impl Into<String>) {
        if self.is_pending() {
            self.qualification_status = QualificationStatus::Disqualified;
            self.disqualification_stage = Some(stage);
            self.disqualification_reason = Some(reason.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualification_fields_freeze_after_decision() {
        let mut task = EvaluationTask::from_objective("Latest EU AI Act guidance", Domain::Politics);
        assert!(task.is_pending());

        task.record_recency(true);
        task.record_necessity(1.4);
        task.qualify();
        assert_eq!(task.qualification_status(), QualificationStatus::Qualified);
        assert_eq!(task.search_necessity_score(), Some(1.0));

        task.disqualify(QualificationStage::SearchNecessity, "too late");
        task.record_necessity(0.1);
        assert_eq!(task.qualification_status(), QualificationStatus::Qualified);
        assert_eq!(task.disqualification_reason(), None);
        assert_eq!(task.disqualification_stage(), None);
        assert_eq!(task.search_necessity_score(), Some(1.0));
    }

    #[test]
    fn test_disqualify_records_reason() {
        let mut task = EvaluationTask::from_objective("What is a prime number?", Domain::Education);
        task.disqualify(QualificationStage::Recency, "Stage 1: timeless question");
        assert_eq!(task.qualification_status(), QualificationStatus::Disqualified);
        assert_eq!(task.disqualification_stage(), Some(QualificationStage::Recency));
        assert_eq!(
            task.disqualification_reason(),
            Some("Stage 1: timeless question")
        );
    }
}

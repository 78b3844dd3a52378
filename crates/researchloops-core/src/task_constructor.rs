use lazy_static::lazy_static;
use researchloops_llm::{Field, Generable, Schema, StructuredGenerator};
use researchloops_logging::{EvaluationProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    Difficulty, Domain, EvaluationConfiguration, EvaluationPrompts, EvaluationTask,
    ExpertiseLevel, Persona, QualificationStage, QualificationStatus, TaskConstructionError,
};

/// Stage 1 disqualifies non-recent tasks whose recency importance is below this
const RECENCY_IMPORTANCE_FLOOR: f64 = 0.3;

#[derive(Debug, Deserialize)]
struct PersonaDraft {
    name: String,
    role: String,
    expertise: ExpertiseLevel,
    information_needs: Vec<String>,
    constraints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PersonaBatch {
    personas: Vec<PersonaDraft>,
}

#[derive(Debug, Deserialize)]
struct TaskDraft {
    objective: String,
    requirements: Vec<String>,
    expected_format: String,
    difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
struct TaskBatch {
    tasks: Vec<TaskDraft>,
}

#[derive(Debug, Deserialize)]
struct RecencyAssessment {
    requires_recent_info: bool,
    recency_importance: f64,
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct NecessityAssessment {
    necessity_score: f64,
    reasoning: String,
}

lazy_static! {
    static ref PERSONA_BATCH: Schema = Schema::new("PersonaBatch", "Research requester personas")
        .field(Field::objects(
            "personas",
            Schema::new("Persona", "One persona")
                .field(Field::string("name", "Full name"))
                .field(Field::string("role", "Job title or role"))
                .field(Field::enumeration(
                    "expertise",
                    &["novice", "intermediate", "expert"],
                    "Expertise in the domain",
                ))
                .field(Field::strings("information_needs", "What they need to find out"))
                .field(Field::strings("constraints", "Limits they work under")),
            "The personas",
        ));
    static ref TASK_BATCH: Schema = Schema::new("TaskBatch", "Research tasks for one persona")
        .field(Field::objects(
            "tasks",
            Schema::new("Task", "One research task")
                .field(Field::string("objective", "The research question"))
                .field(Field::strings("requirements", "Explicit requirements for the answer"))
                .field(Field::string("expected_format", "Shape of the deliverable"))
                .field(Field::enumeration(
                    "difficulty",
                    &["basic", "intermediate", "advanced"],
                    "Task difficulty",
                )),
            "The tasks",
        ));
    static ref RECENCY_ASSESSMENT: Schema =
        Schema::new("RecencyAssessment", "Whether the task needs current information")
            .field(Field::boolean("requires_recent_info", "True if recent information is required"))
            .field(Field::number("recency_importance", 0.0, 1.0, "How much recency matters"))
            .field(Field::string("reasoning", "Brief justification"));
    static ref NECESSITY_ASSESSMENT: Schema =
        Schema::new("NecessityAssessment", "How much web search improves the answer")
            .field(Field::number("necessity_score", 0.0, 1.0, "Search necessity"))
            .field(Field::string("reasoning", "Brief justification"));
}

impl Generable for PersonaBatch {
    fn schema() -> &'static Schema {
        &PERSONA_BATCH
    }
}

impl Generable for TaskBatch {
    fn schema() -> &'static Schema {
        &TASK_BATCH
    }
}

impl Generable for RecencyAssessment {
    fn schema() -> &'static Schema {
        &RECENCY_ASSESSMENT
    }
}

impl Generable for NecessityAssessment {
    fn schema() -> &'static Schema {
        &NECESSITY_ASSESSMENT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisqualifiedTask {
    pub task: EvaluationTask,
    pub stage: QualificationStage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualificationStatistics {
    pub total: usize,
    pub passed_stage1: usize,
    pub passed_stage2: usize,
    pub disqualified_stage1: usize,
    pub disqualified_stage2: usize,
}

impl QualificationStatistics {
    /// Qualified / total, 0 for an empty input
    pub fn qualification_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed_stage2 as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub qualified: Vec<EvaluationTask>,
    pub disqualified: Vec<DisqualifiedTask>,
    pub statistics: QualificationStatistics,
}

/// Builds qualified evaluation tasks from generated personas.
///
/// Generation failures propagate from every operation here; only
/// [`TaskConstructor::construct`] skips personas whose generation failed.
pub struct TaskConstructor {
    generator: Arc<dyn StructuredGenerator>,
    progress: Option<ProgressCallback>,
}

impl TaskConstructor {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self {
            generator,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: EvaluationProgress) {
        if let Some(ref progress) = self.progress {
            progress(&event);
        }
    }

    pub async fn generate_personas(
        &self,
        domain: Domain,
        count: usize,
    ) -> Result<Vec<Persona>, TaskConstructionError> {
        let prompt = EvaluationPrompts::build_personas_prompt(domain, count);
        let batch: PersonaBatch = self.generator.respond(&prompt).await.map_err(|source| {
            TaskConstructionError::Personas {
                domain: domain.to_string(),
                source,
            }
        })?;

        let personas: Vec<Persona> = batch
            .personas
            .into_iter()
            .take(count)
            .map(|draft| {
                Persona::new(draft.name, domain, draft.role, draft.expertise)
                    .with_information_needs(draft.information_needs)
                    .with_constraints(draft.constraints)
            })
            .collect();

        debug!(domain = %domain, count = personas.len(), "Generated personas");
        self.emit(EvaluationProgress::PersonasGenerated {
            domain: domain.to_string(),
            count: personas.len(),
        });
        Ok(personas)
    }

    pub async fn generate_tasks(
        &self,
        persona: &Persona,
        count: usize,
    ) -> Result<Vec<EvaluationTask>, TaskConstructionError> {
        let prompt = EvaluationPrompts::build_tasks_prompt(persona, count);
        let batch: TaskBatch = self.generator.respond(&prompt).await.map_err(|source| {
            TaskConstructionError::Tasks {
                persona: persona.name.clone(),
                source,
            }
        })?;

        let tasks: Vec<EvaluationTask> = batch
            .tasks
            .into_iter()
            .take(count)
            .map(|draft| {
                EvaluationTask::new(
                    persona.clone(),
                    draft.objective,
                    draft.requirements,
                    draft.expected_format,
                    draft.difficulty,
                )
            })
            .collect();

        self.emit(EvaluationProgress::TasksGenerated {
            persona: persona.name.clone(),
            count: tasks.len(),
        });
        Ok(tasks)
    }

    /// Run Stage 1 then, if it passed, Stage 2 on a pending task.
    ///
    /// Returns the failing stage and the model's reasoning when the task is
    /// disqualified. The task's qualification fields are updated either way.
    /// A task that was already decided keeps its earlier decision and costs
    /// no generation calls.
    pub async fn qualify_task(
        &self,
        task: &mut EvaluationTask,
        qualification_threshold: f64,
    ) -> Result<Option<(QualificationStage, String)>, TaskConstructionError> {
        match task.qualification_status() {
            QualificationStatus::Pending => {}
            QualificationStatus::Qualified => return Ok(None),
            QualificationStatus::Disqualified => {
                let stage = task
                    .disqualification_stage()
                    .unwrap_or(QualificationStage::SearchNecessity);
                let reason = task.disqualification_reason().unwrap_or_default().to_string();
                return Ok(Some((stage, reason)));
            }
        }

        let task_id = task.id.to_string();

        let recency: RecencyAssessment = self
            .generator
            .respond(&EvaluationPrompts::build_recency_prompt(task))
            .await
            .map_err(|source| TaskConstructionError::Qualification {
                task_id: task_id.clone(),
                stage: QualificationStage::Recency.number(),
                source,
            })?;
        task.record_recency(recency.requires_recent_info);

        if !recency.requires_recent_info && recency.recency_importance < RECENCY_IMPORTANCE_FLOOR {
            task.disqualify(QualificationStage::Recency, recency.reasoning.clone());
            return Ok(Some((QualificationStage::Recency, recency.reasoning)));
        }

        let necessity: NecessityAssessment = self
            .generator
            .respond(&EvaluationPrompts::build_necessity_prompt(task))
            .await
            .map_err(|source| TaskConstructionError::Qualification {
                task_id,
                stage: QualificationStage::SearchNecessity.number(),
                source,
            })?;
        task.record_necessity(necessity.necessity_score);

        if necessity.necessity_score < qualification_threshold {
            task.disqualify(QualificationStage::SearchNecessity, necessity.reasoning.clone());
            return Ok(Some((QualificationStage::SearchNecessity, necessity.reasoning)));
        }

        task.qualify();
        Ok(None)
    }

    /// Two-stage qualification over every task, strictly sequential per task
    pub async fn filter_tasks(
        &self,
        tasks: Vec<EvaluationTask>,
        qualification_threshold: f64,
    ) -> Result<FilterOutcome, TaskConstructionError> {
        let mut outcome = FilterOutcome {
            statistics: QualificationStatistics {
                total: tasks.len(),
                ..Default::default()
            },
            ..Default::default()
        };
        self.emit(EvaluationProgress::QualificationStarted {
            total_tasks: tasks.len(),
        });

        for mut task in tasks {
            match self.qualify_task(&mut task, qualification_threshold).await? {
                None => {
                    outcome.statistics.passed_stage1 += 1;
                    outcome.statistics.passed_stage2 += 1;
                    self.emit(EvaluationProgress::TaskQualified {
                        task_id: task.id.to_string(),
                        necessity_score: task.search_necessity_score().unwrap_or_default(),
                    });
                    outcome.qualified.push(task);
                }
                Some((stage, reason)) => {
                    match stage {
                        QualificationStage::Recency => outcome.statistics.disqualified_stage1 += 1,
                        QualificationStage::SearchNecessity => {
                            outcome.statistics.passed_stage1 += 1;
                            outcome.statistics.disqualified_stage2 += 1;
                        }
                    }
                    debug!(task_id = %task.id, stage = stage.number(), %reason, "Task disqualified");
                    self.emit(EvaluationProgress::TaskDisqualified {
                        task_id: task.id.to_string(),
                        stage: stage.number(),
                        reason: reason.clone(),
                    });
                    outcome.disqualified.push(DisqualifiedTask { task, stage, reason });
                }
            }
        }

        self.emit(EvaluationProgress::QualificationCompleted {
            qualified: outcome.qualified.len(),
            disqualified: outcome.disqualified.len(),
            qualification_rate: outcome.statistics.qualification_rate(),
        });
        Ok(outcome)
    }

    /// Personas and tasks for every configured domain, then qualification.
    ///
    /// A persona or task generation failure skips that domain or persona;
    /// qualification failures propagate.
    pub async fn construct(
        &self,
        config: &EvaluationConfiguration,
    ) -> Result<FilterOutcome, TaskConstructionError> {
        let mut candidates = Vec::new();
        for &domain in &config.domains_to_use {
            let personas = match self.generate_personas(domain, config.personas_per_domain).await {
                Ok(personas) => personas,
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Skipping domain");
                    continue;
                }
            };
            for persona in &personas {
                match self.generate_tasks(persona, config.tasks_per_persona).await {
                    Ok(tasks) => candidates.extend(tasks),
                    Err(e) => warn!(persona = %persona.name, error = %e, "Skipping persona"),
                }
            }
        }

        info!(candidates = candidates.len(), "Qualifying candidate tasks");
        self.filter_tasks(candidates, config.qualification_threshold)
            .await
    }
}

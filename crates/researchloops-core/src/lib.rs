//! # researchloops-core
//!
//! The evaluation engine: builds qualified research tasks, scores a research
//! answer on adaptive quality dimensions, fact-checks its statements against
//! web evidence and blends both into a single [`EvaluationResult`].
//!
//! ## Key Types
//!
//! - [`TaskConstructor`] - Personas, candidate tasks, two-stage qualification
//! - [`QualityEvaluator`] - General + task-specific dimension scoring
//! - [`FactChecker`] - Extraction, evidence retrieval, verification
//! - [`EvaluationOrchestrator`] - Runs both evaluators and combines results
//! - [`EvaluationConfiguration`] - Every tunable knob of the engine
//! - [`ResearchAgent`] - The agent under evaluation, used when re-running research
//!
//! Every component takes its generator explicitly. Components that may run
//! concurrently (quality and fact checking) should be given independent
//! generators.

mod config;
mod error;
pub mod fact_check;
pub mod model;
mod orchestrator;
mod prompts;
mod quality_evaluator;
mod research;
mod task_constructor;

pub use config::{ConfigError, EvaluationConfiguration};
pub use error::TaskConstructionError;
pub use fact_check::FactChecker;
pub use model::*;
pub use orchestrator::{BatchInput, EvaluationOrchestrator, ResearchOutcome};
pub use prompts::{truncate_output, EvaluationPrompts};
pub use quality_evaluator::{normalize_weights, QualityEvaluator};
pub use research::{ResearchAgent, ResearchError};
pub use task_constructor::{
    DisqualifiedTask, FilterOutcome, QualificationStatistics, TaskConstructor,
};

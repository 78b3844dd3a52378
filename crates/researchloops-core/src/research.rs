use async_trait::async_trait;
use thiserror::Error;

use crate::{EvaluationTask, ResearchOutput};

#[derive(Error, Debug)]
#[error("Research run failed: {0}")]
pub struct ResearchError(pub String);

/// The deep-research agent under evaluation.
///
/// `instructions` is the agent's prompt template rendered with the
/// parameter values being tried.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn research(
        &self,
        task: &EvaluationTask,
        instructions: &str,
    ) -> Result<ResearchOutput, ResearchError>;
}

use researchloops_llm::GenerationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskConstructionError {
    #[error("Persona generation failed for {domain}: {source}")]
    Personas {
        domain: String,
        #[source]
        source: GenerationError,
    },

    #[error("Task generation failed for persona {persona}: {source}")]
    Tasks {
        persona: String,
        #[source]
        source: GenerationError,
    },

    #[error("Qualification stage {stage} failed for task {task_id}: {source}")]
    Qualification {
        task_id: String,
        stage: u8,
        #[source]
        source: GenerationError,
    },
}

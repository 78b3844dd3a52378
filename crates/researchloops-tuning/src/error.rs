use researchloops_llm::GenerationError;
use thiserror::Error;

use crate::ParameterType;

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("Template `{template}` has no parameter `{parameter}`")]
    UnknownParameter { template: String, parameter: String },

    #[error("Parameter `{parameter}` expects {expected}, got `{found}`")]
    TypeMismatch {
        parameter: String,
        expected: ParameterType,
        found: String,
    },

    #[error("Parameter `{parameter}` does not allow `{value}` (allowed: {allowed:?})")]
    NotAllowed {
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum TuningError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid A/B test: {0}")]
    InvalidABTest(String),
}

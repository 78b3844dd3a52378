//! # researchloops-tuning
//!
//! Turns evaluation results into prompt-parameter changes and keeps a
//! bounded, rollback-capable history of what was tried.
//!
//! ## Key Types
//!
//! - [`FeedbackAnalyzer`] - Weakness diagnosis and prioritised suggestions
//! - [`AutoTuner`] - Suggestions to parameter adjustments, with optional A/B validation
//! - [`ABTestRunner`] - Baseline vs variant runs scored with Welch's t-test
//! - [`VersionManager`] - Size-bounded version history with score-based rollback
//! - [`PromptTemplate`] - Typed, bounded parameters substituted into a prompt

mod error;
mod feedback;
mod prompts;
pub mod stats;
mod template;
mod tuner;
mod version;

pub use ab_test::{ABTestConfiguration, ABTestResult, ABTestRunner};
pub use error::{TemplateError, TuningError};
pub use feedback::{
    extract_priority_actions, FeedbackAnalysis, FeedbackAnalyzer, ImprovementSuggestion,
    PipelinePhase, Priority, ScoreSnapshot, Weakness, WeaknessCategory,
};
pub use prompts::TuningPrompts;
pub use template::{ParameterType, ParameterValue, PromptParameter, PromptTemplate};
pub use tuner::{ABValidation, AutoTuneRun, AutoTuner, ParameterAdjustment, TuningOutcome};
pub use version::{PromptVersion, VersionManager};

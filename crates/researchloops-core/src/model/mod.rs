//! Data model shared by every evaluation component.

mod evaluation;
mod fact;
mod persona;
mod quality;
mod task;

pub use evaluation::{
    BatchEvaluationResult, BatchFailure, EvaluationResult, ResearchOutput, ScoreStatistics,
};
pub use fact::{
    Evidence, FactCheckResult, FactVerificationResult, StatementType, SupportLevel,
    VerifiableStatement, Verdict,
};
pub use persona::{Domain, ExpertiseLevel, Persona};
pub use quality::{DimensionScore, QualityDimension, QualityEvaluationResult};
pub use task::{Difficulty, EvaluationTask, QualificationStage, QualificationStatus};

/// Clamp to [0, 1]; NaN becomes 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp a raw model score to the 1..=10 rubric range
pub(crate) fn clamp_score(raw: i64) -> u8 {
    raw.clamp(1, 10) as u8
}

/// Deserializers that re-apply construction clamps to stored values
pub mod clamped {
    use serde::{Deserialize, Deserializer};

    pub fn unit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer).map(super::clamp_unit)
    }

    pub fn score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        i64::deserialize(deserializer).map(super::clamp_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(0.42), 0.42);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(0), 1);
        assert_eq!(clamp_score(-5), 1);
        assert_eq!(clamp_score(11), 10);
        assert_eq!(clamp_score(7), 7);
    }
}

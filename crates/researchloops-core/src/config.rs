use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::Domain;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("`{field}` must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("`domains_to_use` must name at least one domain")]
    NoDomains,
}

/// Every option the evaluation engine consumes.
///
/// `general_dimension_weight` and `task_specific_dimension_weight` are used
/// twice: as the general/task-specific split inside quality scoring, and as
/// the quality/factual blend of the overall score. The blend is not
/// rescaled, so a pair that does not sum to 1 scales the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfiguration {
    /// Domains to generate personas for
    pub domains_to_use: Vec<Domain>,
    pub personas_per_domain: usize,
    pub tasks_per_persona: usize,
    /// Stage 2 cutoff on the search necessity score
    pub qualification_threshold: f64,
    pub general_dimension_weight: f64,
    pub task_specific_dimension_weight: f64,
    pub max_task_specific_dimensions: usize,
    pub max_statements_to_verify: usize,
    pub evidence_per_statement: usize,
    pub verification_confidence_threshold: f64,
    pub run_evaluations_in_parallel: bool,
    pub auto_tuning_enabled: bool,
    /// Minimum A/B improvement (percent) required to accept a variant
    pub min_improvement_threshold: f64,
    /// Degradation (percent) beyond which a tuning run rolls back
    pub max_degradation_threshold: f64,
    /// Target end-to-end latency; exceeded evaluations are logged, not aborted
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
    /// Timeout applied to each evidence page fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Overall score at or above which a batch item counts as passing
    pub pass_threshold: f64,
}

impl Default for EvaluationConfiguration {
    fn default() -> Self {
        Self {
            domains_to_use: Domain::ALL.to_vec(),
            personas_per_domain: 2,
            tasks_per_persona: 3,
            qualification_threshold: 0.6,
            general_dimension_weight: 0.6,
            task_specific_dimension_weight: 0.4,
            max_task_specific_dimensions: 4,
            max_statements_to_verify: 10,
            evidence_per_statement: 3,
            verification_confidence_threshold: 0.7,
            run_evaluations_in_parallel: true,
            auto_tuning_enabled: false,
            min_improvement_threshold: 5.0,
            max_degradation_threshold: 10.0,
            operation_timeout: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
            pass_threshold: 70.0,
        }
    }
}

impl EvaluationConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains_to_use.is_empty() {
            return Err(ConfigError::NoDomains);
        }

        let unit_fields = [
            ("qualification_threshold", self.qualification_threshold),
            ("general_dimension_weight", self.general_dimension_weight),
            (
                "task_specific_dimension_weight",
                self.task_specific_dimension_weight,
            ),
            (
                "verification_confidence_threshold",
                self.verification_confidence_threshold,
            ),
        ];
        for (field, value) in unit_fields {
            check_range(field, value, 0.0, 1.0)?;
        }
        check_range("min_improvement_threshold", self.min_improvement_threshold, 0.0, 100.0)?;
        check_range("max_degradation_threshold", self.max_degradation_threshold, 0.0, 100.0)?;
        check_range("pass_threshold", self.pass_threshold, 0.0, 100.0)?;

        let counts = [
            ("personas_per_domain", self.personas_per_domain),
            ("tasks_per_persona", self.tasks_per_persona),
            ("max_statements_to_verify", self.max_statements_to_verify),
            ("evidence_per_statement", self.evidence_per_statement),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }
        Ok(())
    }

    /// Quality/factual blend weights, used as configured
    pub fn blend_weights(&self) -> (f64, f64) {
        (
            self.general_dimension_weight,
            self.task_specific_dimension_weight,
        )
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EvaluationConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blend_weights(), (0.6, 0.4));
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        let config = EvaluationConfiguration {
            general_dimension_weight: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "general_dimension_weight",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_counts_and_empty_domains() {
        let config = EvaluationConfiguration {
            evidence_per_statement: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("evidence_per_statement"))
        );

        let config = EvaluationConfiguration {
            domains_to_use: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoDomains));
    }

    #[test]
    fn test_blend_weights_are_not_rescaled() {
        let config = EvaluationConfiguration {
            general_dimension_weight: 0.5,
            task_specific_dimension_weight: 0.3,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.blend_weights(), (0.5, 0.3));
    }

    #[test]
    fn test_parses_partial_toml_with_humantime() {
        let config: EvaluationConfiguration = toml::from_str(
            r#"
domains_to_use = ["technology", "healthcare"]
max_statements_to_verify = 4
operation_timeout = "2m"
"#,
        )
        .unwrap();
        assert_eq!(config.domains_to_use, vec![Domain::Technology, Domain::Healthcare]);
        assert_eq!(config.max_statements_to_verify, 4);
        assert_eq!(config.operation_timeout, Duration::from_secs(120));
        assert_eq!(config.evidence_per_statement, 3);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result: Result<EvaluationConfiguration, _> = toml::from_str("unknown_knob = 1");
        assert!(result.is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::{clamp_unit, clamped};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Numeric,
    Temporal,
    Entity,
    Causal,
    Comparative,
}

/// A factual claim extracted from a research answer.
///
/// Identity is derived from the statement text, so re-extracting the same
/// claim yields the same id. Equality and hashing use the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableStatement {
    pub id: String,
    pub text: String,
    pub statement_type: StatementType,
    pub source_section: String,
    #[serde(deserialize_with = "clamped::unit")]
    confidence: f64,
    pub suggested_query: Option<String>,
    pub line_number: Option<u32>,
}

impl VerifiableStatement {
    pub fn new(
        text: impl Into<String>,
        statement_type: StatementType,
        source_section: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let text = text.into();
        Self {
            id: statement_id(&text),
            text,
            statement_type,
            source_section: source_section.into(),
            confidence: clamp_unit(confidence),
            suggested_query: None,
            line_number: None,
        }
    }

    pub fn with_suggested_query(mut self, query: Option<String>) -> Self {
        self.suggested_query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_line_number(mut self, line: Option<u32>) -> Self {
        self.line_number = line;
        self
    }

    /// Verifiability confidence in [0, 1]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl PartialEq for VerifiableStatement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VerifiableStatement {}

impl Hash for VerifiableStatement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn statement_id(text: &str) -> String {
    let digest = Sha256::digest(text.trim().as_bytes());
    hex::encode(&digest[..8])
}

/// How a page bears on a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    StrongSupport,
    Support,
    Neutral,
    Contradict,
    StrongContradict,
}

impl SupportLevel {
    pub fn score(&self) -> f64 {
        match self {
            SupportLevel::StrongSupport => 1.0,
            SupportLevel::Support => 0.5,
            SupportLevel::Neutral => 0.0,
            SupportLevel::Contradict => -0.5,
            SupportLevel::StrongContradict => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportLevel::StrongSupport => "strong_support",
            SupportLevel::Support => "support",
            SupportLevel::Neutral => "neutral",
            SupportLevel::Contradict => "contradict",
            SupportLevel::StrongContradict => "strong_contradict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source_url: String,
    pub title: String,
    pub relevant_text: String,
    pub support_level: SupportLevel,
    #[serde(deserialize_with = "clamped::unit")]
    credibility: f64,
    pub retrieved_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        relevant_text: impl Into<String>,
        support_level: SupportLevel,
        credibility: f64,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            relevant_text: relevant_text.into(),
            support_level,
            credibility: clamp_unit(credibility),
            retrieved_at: Utc::now(),
        }
    }

    pub fn credibility(&self) -> f64 {
        self.credibility
    }

    /// Neutral pages with no excerpt carry no information
    pub fn is_informative(&self) -> bool {
        self.support_level != SupportLevel::Neutral || !self.relevant_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    PartiallyCorrect,
    Unknown,
    ErrorOccurred,
}

impl Verdict {
    /// Only these verdicts may carry a correction
    pub fn allows_correction(&self) -> bool {
        matches!(self, Verdict::Incorrect | Verdict::PartiallyCorrect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
            Verdict::PartiallyCorrect => "partially_correct",
            Verdict::Unknown => "unknown",
            Verdict::ErrorOccurred => "error_occurred",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VerificationRecord")]
pub struct FactVerificationResult {
    pub statement: VerifiableStatement,
    pub verdict: Verdict,
    pub evidence: Vec<Evidence>,
    confidence: f64,
    pub explanation: String,
    correction: Option<String>,
}

impl FactVerificationResult {
    /// Any correction is dropped unless the verdict allows one
    pub fn new(
        statement: VerifiableStatement,
        verdict: Verdict,
        evidence: Vec<Evidence>,
        confidence: f64,
        explanation: impl Into<String>,
        correction: Option<String>,
    ) -> Self {
        let correction = correction
            .filter(|_| verdict.allows_correction())
            .filter(|c| !c.trim().is_empty());
        Self {
            statement,
            verdict,
            evidence,
            confidence: clamp_unit(confidence),
            explanation: explanation.into(),
            correction,
        }
    }

    /// No evidence was available to judge the statement
    pub fn unknown(statement: VerifiableStatement) -> Self {
        Self::new(
            statement,
            Verdict::Unknown,
            Vec::new(),
            0.0,
            "No evidence could be retrieved for this statement",
            None,
        )
    }

    /// The statement's pipeline failed; the message becomes the explanation
    pub fn error(statement: VerifiableStatement, message: impl Into<String>) -> Self {
        Self::new(statement, Verdict::ErrorOccurred, Vec::new(), 0.0, message, None)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn correction(&self) -> Option<&str> {
        self.correction.as_deref()
    }
}

#[derive(Deserialize)]
struct VerificationRecord {
    statement: VerifiableStatement,
    verdict: Verdict,
    #[serde(default)]
    evidence: Vec<Evidence>,
    confidence: f64,
    #[serde(default)]
    explanation: String,
    correction: Option<String>,
}

impl From<VerificationRecord> for FactVerificationResult {
    fn from(r: VerificationRecord) -> Self {
        Self::new(
            r.statement,
            r.verdict,
            r.evidence,
            r.confidence,
            r.explanation,
            r.correction,
        )
    }
}

/// Aggregate of every statement verification.
///
/// `accuracy = correct / (correct + incorrect) * 100`; partially correct,
/// unknown and errored statements are not in the denominator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FactCheckRecord")]
pub struct FactCheckResult {
    pub verifications: Vec<FactVerificationResult>,
    pub total_statements: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub partially_correct_count: usize,
    pub unknown_count: usize,
    pub error_count: usize,
    pub accuracy: f64,
}

impl FactCheckResult {
    pub fn from_verifications(verifications: Vec<FactVerificationResult>) -> Self {
        let count = |v: Verdict| verifications.iter().filter(|r| r.verdict == v).count();
        let correct_count = count(Verdict::Correct);
        let incorrect_count = count(Verdict::Incorrect);
        let partially_correct_count = count(Verdict::PartiallyCorrect);
        let unknown_count = count(Verdict::Unknown);
        let error_count = count(Verdict::ErrorOccurred);

        let judged = correct_count + incorrect_count;
        let accuracy = if judged == 0 {
            0.0
        } else {
            correct_count as f64 / judged as f64 * 100.0
        };

        Self {
            total_statements: verifications.len(),
            verifications,
            correct_count,
            incorrect_count,
            partially_correct_count,
            unknown_count,
            error_count,
            accuracy,
        }
    }

    pub fn empty() -> Self {
        Self::from_verifications(Vec::new())
    }

    /// Incorrect or partially correct statements paired with their correction
    pub fn errors_with_corrections(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.verifications
            .iter()
            .filter(|v| v.verdict.allows_correction())
            .map(|v| (v.statement.text.as_str(), v.correction()))
    }
}

#[derive(Deserialize)]
struct FactCheckRecord {
    #[serde(default)]
    verifications: Vec<FactVerificationResult>,
}

impl From<FactCheckRecord> for FactCheckResult {
    fn from(record: FactCheckRecord) -> Self {
        Self::from_verifications(record.verifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(text: &str) -> VerifiableStatement {
        VerifiableStatement::new(text, StatementType::Numeric, "Findings", 0.9)
    }

    fn verification(text: &str, verdict: Verdict) -> FactVerificationResult {
        FactVerificationResult::new(statement(text), verdict, vec![], 0.8, "", None)
    }

    #[test]
    fn test_statement_identity_is_text_derived() {
        let a = statement("Rust 1.0 shipped in 2015");
        let b = VerifiableStatement::new("Rust 1.0 shipped in 2015", StatementType::Temporal, "Intro", 0.1);
        assert_eq!(a, b);
        assert_eq!(a.id.len(), 16);
        assert_ne!(a, statement("Rust 1.0 shipped in 2016"));
    }

    #[test]
    fn test_confidence_and_credibility_are_clamped() {
        let s = VerifiableStatement::new("x", StatementType::Entity, "", 3.0);
        assert_eq!(s.confidence(), 1.0);
        let e = Evidence::new("https://a", "A", "", SupportLevel::Support, -2.0);
        assert_eq!(e.credibility(), 0.0);
        let v = FactVerificationResult::new(s, Verdict::Correct, vec![], 1.5, "", None);
        assert_eq!(v.confidence(), 1.0);
    }

    #[test]
    fn test_correction_kept_only_for_wrong_verdicts() {
        let fix = Some("It was 2015".to_string());
        for verdict in [Verdict::Correct, Verdict::Unknown, Verdict::ErrorOccurred] {
            let v = FactVerificationResult::new(statement("s"), verdict, vec![], 0.5, "", fix.clone());
            assert_eq!(v.correction(), None, "{:?}", verdict);
        }
        for verdict in [Verdict::Incorrect, Verdict::PartiallyCorrect] {
            let v = FactVerificationResult::new(statement("s"), verdict, vec![], 0.5, "", fix.clone());
            assert_eq!(v.correction(), Some("It was 2015"));
        }
    }

    #[test]
    fn test_correction_invariant_holds_after_deserialization() {
        let v = FactVerificationResult::new(statement("s"), Verdict::Incorrect, vec![], 0.5, "", Some("fix".into()));
        let mut value = serde_json::to_value(&v).unwrap();
        value["verdict"] = serde_json::json!("correct");
        let loaded: FactVerificationResult = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.correction(), None);
    }

    #[test]
    fn test_accuracy_excludes_unknown_and_errors() {
        let result = FactCheckResult::from_verifications(vec![
            verification("a", Verdict::Correct),
            verification("b", Verdict::Correct),
            verification("c", Verdict::Correct),
            verification("d", Verdict::Incorrect),
            verification("e", Verdict::Unknown),
            verification("f", Verdict::ErrorOccurred),
            verification("g", Verdict::PartiallyCorrect),
        ]);
        assert_eq!(result.total_statements, 7);
        assert_eq!(result.correct_count, 3);
        assert_eq!(result.unknown_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.partially_correct_count, 1);
        assert!((result.accuracy - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_zero_without_judged_statements() {
        let result = FactCheckResult::from_verifications(vec![
            verification("a", Verdict::Unknown),
            verification("b", Verdict::Unknown),
        ]);
        assert_eq!(result.accuracy, 0.0);
        assert_eq!(FactCheckResult::empty().total_statements, 0);
    }

    #[test]
    fn test_neutral_evidence_without_text_is_uninformative() {
        assert!(!Evidence::new("u", "t", "  ", SupportLevel::Neutral, 0.5).is_informative());
        assert!(Evidence::new("u", "t", "excerpt", SupportLevel::Neutral, 0.5).is_informative());
        assert!(Evidence::new("u", "t", "", SupportLevel::Contradict, 0.5).is_informative());
        assert_eq!(SupportLevel::StrongContradict.score(), -1.0);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Subject area a persona researches in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Technology,
    Science,
    Business,
    Healthcare,
    Finance,
    Politics,
    Education,
    Environment,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Technology,
        Domain::Science,
        Domain::Business,
        Domain::Healthcare,
        Domain::Finance,
        Domain::Politics,
        Domain::Education,
        Domain::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Technology => "technology",
            Domain::Science => "science",
            Domain::Business => "business",
            Domain::Healthcare => "healthcare",
            Domain::Finance => "finance",
            Domain::Politics => "politics",
            Domain::Education => "education",
            Domain::Environment => "environment",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| format!("Unknown domain: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLevel {
    Novice,
    Intermediate,
    Expert,
}

impl ExpertiseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertiseLevel::Novice => "novice",
            ExpertiseLevel::Intermediate => "intermediate",
            ExpertiseLevel::Expert => "expert",
        }
    }
}

/// Synthetic profile of a research requester.
///
/// Personas are never mutated after construction; tasks carry them by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub domain: Domain,
    pub role: String,
    pub expertise: ExpertiseLevel,
    pub information_needs: Vec<String>,
    pub constraints: Vec<String>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        domain: Domain,
        role: impl Into<String>,
        expertise: ExpertiseLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            domain,
            role: role.into(),
            expertise,
            information_needs: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_information_needs(mut self, needs: Vec<String>) -> Self {
        self.information_needs = needs;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    /// One-line description used inside prompts
    pub fn describe(&self) -> String {
        format!(
            "{} ({}, {} expertise, {})",
            self.name,
            self.role,
            self.expertise.as_str(),
            self.domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse_and_display() {
        assert_eq!("Healthcare".parse::<Domain>().unwrap(), Domain::Healthcare);
        assert_eq!(Domain::Finance.to_string(), "finance");
        assert!("astrology".parse::<Domain>().is_err());
    }

    #[test]
    fn test_persona_describe() {
        let persona = Persona::new("Dana", Domain::Science, "Lab lead", ExpertiseLevel::Expert)
            .with_information_needs(vec!["assay costs".into()]);
        assert_eq!(
            persona.describe(),
            "Dana (Lab lead, expert expertise, science)"
        );
        assert_eq!(persona.information_needs.len(), 1);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::TemplateError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringArray(Vec<String>),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(i) => Some(*i as f64),
            ParameterValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Int(i) => write!(f, "{}", i),
            ParameterValue::Float(x) => write!(f, "{}", x),
            ParameterValue::String(s) => f.write_str(s),
            ParameterValue::StringArray(items) => f.write_str(&items.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Int,
    Float,
    Bool,
    StringArray,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParameterType::String => "a string",
            ParameterType::Int => "an integer",
            ParameterType::Float => "a number",
            ParameterType::Bool => "a boolean",
            ParameterType::StringArray => "a list of strings",
        })
    }
}

/// A typed, optionally bounded or enumerated tunable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub description: String,
    pub default: ParameterValue,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Empty means unrestricted
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

impl PromptParameter {
    pub fn new(name: impl Into<String>, kind: ParameterType, default: ParameterValue) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            default,
            min: None,
            max: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<String>) -> Self {
        self.allowed_values = values;
        self
    }

    /// Check a value against this parameter's type, clamping numbers into bounds
    pub fn coerce(&self, value: ParameterValue) -> Result<ParameterValue, TemplateError> {
        use ParameterValue as V;
        match (self.kind, value) {
            (ParameterType::Int, V::Int(i)) => Ok(V::Int(self.clamp_int(i as f64))),
            (ParameterType::Int, V::Float(x)) if x.is_finite() => Ok(V::Int(self.clamp_int(x))),
            (ParameterType::Float, V::Float(x)) if x.is_finite() => Ok(V::Float(self.clamp(x))),
            (ParameterType::Float, V::Int(i)) => Ok(V::Float(self.clamp(i as f64))),
            (ParameterType::Bool, V::Bool(b)) => Ok(V::Bool(b)),
            (ParameterType::String, V::String(s)) => {
                self.check_allowed(&s)?;
                Ok(V::String(s))
            }
            (ParameterType::StringArray, V::StringArray(items)) => {
                for item in &items {
                    self.check_allowed(item)?;
                }
                Ok(V::StringArray(items))
            }
            (_, other) => Err(self.mismatch(&other.to_string())),
        }
    }

    /// Parse a textual value (as proposed by a model) for this parameter
    pub fn parse_value(&self, raw: &str) -> Result<ParameterValue, TemplateError> {
        let raw = raw.trim();
        let value = match self.kind {
            ParameterType::Int | ParameterType::Float => raw
                .parse::<i64>()
                .map(ParameterValue::Int)
                .or_else(|_| raw.parse::<f64>().map(ParameterValue::Float))
                .map_err(|_| self.mismatch(raw))?,
            ParameterType::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" => ParameterValue::Bool(true),
                "false" | "no" => ParameterValue::Bool(false),
                _ => return Err(self.mismatch(raw)),
            },
            ParameterType::String => ParameterValue::String(raw.to_string()),
            ParameterType::StringArray => match serde_json::from_str::<Vec<String>>(raw) {
                Ok(items) => ParameterValue::StringArray(items),
                Err(_) => ParameterValue::StringArray(
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                ),
            },
        };
        self.coerce(value)
    }

    fn clamp(&self, x: f64) -> f64 {
        let x = self.min.map_or(x, |lo| x.max(lo));
        self.max.map_or(x, |hi| x.min(hi))
    }

    fn clamp_int(&self, x: f64) -> i64 {
        self.clamp(x.round()).round() as i64
    }

    fn check_allowed(&self, value: &str) -> Result<(), TemplateError> {
        if self.allowed_values.is_empty() || self.allowed_values.iter().any(|a| a == value) {
            Ok(())
        } else {
            Err(TemplateError::NotAllowed {
                parameter: self.name.clone(),
                value: value.to_string(),
                allowed: self.allowed_values.clone(),
            })
        }
    }

    fn mismatch(&self, found: &str) -> TemplateError {
        TemplateError::TypeMismatch {
            parameter: self.name.clone(),
            expected: self.kind,
            found: found.to_string(),
        }
    }
}

/// A prompt with `{{name}}` placeholders and the current value of each
/// declared parameter. Parameters without a set value use their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub parameters: Vec<PromptParameter>,
    #[serde(default)]
    values: BTreeMap<String, ParameterValue>,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
        parameters: Vec<PromptParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            parameters,
            values: BTreeMap::new(),
        }
    }

    pub fn contains(&self, parameter: &str) -> bool {
        self.parameter(parameter).is_some()
    }

    pub fn parameter(&self, name: &str) -> Option<&PromptParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&ParameterValue> {
        self.values
            .get(name)
            .or_else(|| self.parameter(name).map(|p| &p.default))
    }

    /// Current value of every declared parameter
    pub fn values(&self) -> BTreeMap<String, ParameterValue> {
        self.parameters
            .iter()
            .filter_map(|p| self.value(&p.name).map(|v| (p.name.clone(), v.clone())))
            .collect()
    }

    /// Validate and store a value, returning what was stored after clamping
    pub fn set_value(
        &mut self,
        name: &str,
        value: ParameterValue,
    ) -> Result<ParameterValue, TemplateError> {
        let parameter = self
            .parameter(name)
            .ok_or_else(|| TemplateError::UnknownParameter {
                template: self.name.clone(),
                parameter: name.to_string(),
            })?;
        let value = parameter.coerce(value)?;
        self.values.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Substitute every known `{{name}}`; unknown placeholders stay verbatim
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            match self.value(after[..end].trim()) {
                Some(value) => out.push_str(&value.to_string()),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        out
    }
}

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{AgentError, Generable, Schema};

/// Errors surfaced by a structured generation call
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Agent execution error: {0}")]
    Agent(#[from] AgentError),

    #[error("Generator output is not valid JSON: {0}")]
    Format(String),

    #[error("Response does not match schema `{schema}`: {reason}")]
    Schema { schema: String, reason: String },

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// True when the model answered but its output could not be coerced
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format(_) | Self::Schema { .. })
    }
}

/// The `generate(prompt, schema)` capability.
///
/// Implementations are not assumed to be reentrant within one logical
/// session; concurrent callers should hold independent generators.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Submit a prompt and return the raw JSON value the model produced.
    /// The schema is passed so the implementation can render format instructions.
    async fn generate_value(&self, prompt: &str, schema: &Schema) -> Result<Value, GenerationError>;
}

impl dyn StructuredGenerator {
    /// Generate, coerce and deserialize a typed response
    pub async fn respond<T: Generable>(&self, prompt: &str) -> Result<T, GenerationError> {
        let schema = T::schema();
        debug!(
            generator = self.name(),
            schema = schema.name,
            prompt_len = prompt.len(),
            "Requesting structured response"
        );
        let raw = self.generate_value(prompt, schema).await?;
        let value = schema.coerce_and_validate(raw)?;
        serde_json::from_value(value).map_err(|e| GenerationError::Schema {
            schema: schema.name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Extract the first JSON object or array from model output that may be
/// wrapped in markdown fences or surrounded by prose.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = strip_fences(response.trim());
    let start = trimmed.find(['{', '['])?;
    let bytes = trimmed.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&trimmed[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_fences(text: &str) -> &str {
    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        let body_start = after_start.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_start[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fence() {
        let input = "Here you go:\n```json\n{\"score\": 8, \"reasoning\": \"ok\"}\n```\nThanks";
        assert_eq!(
            extract_json(input),
            Some("{\"score\": 8, \"reasoning\": \"ok\"}")
        );
    }

    #[test]
    fn test_extract_json_with_surrounding_prose() {
        let input = "My answer is {\"a\": {\"b\": \"}\"}} and that's it.";
        assert_eq!(extract_json(input), Some("{\"a\": {\"b\": \"}\"}}"));
    }

    #[test]
    fn test_extract_json_array() {
        assert_eq!(extract_json("[1, [2, 3]] trailing"), Some("[1, [2, 3]]"));
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert_eq!(extract_json("{\"a\": 1"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_format_error_kind() {
        assert!(GenerationError::Format("x".into()).is_format_error());
        assert!(!GenerationError::Unavailable("x".into()).is_format_error());
    }
}

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::GenerationError;

/// A response record that can be requested from a [`StructuredGenerator`].
///
/// Implementors return a schema built once (usually in a `lazy_static!` block)
/// and derive `Deserialize` with field names matching the schema.
///
/// [`StructuredGenerator`]: crate::StructuredGenerator
pub trait Generable: DeserializeOwned {
    fn schema() -> &'static Schema;
}

/// The type and constraints of a single schema field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    /// One of a fixed set of lowercase snake_case values
    Enumeration(Vec<&'static str>),
    StringArray,
    Object(Schema),
    ObjectArray(Schema),
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Integer { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("integer {}..{}", lo, hi),
                _ => "integer".to_string(),
            },
            FieldKind::Number { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("number {}..{}", lo, hi),
                _ => "number".to_string(),
            },
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Enumeration(values) => format!("one of: {}", values.join(" | ")),
            FieldKind::StringArray => "array of strings".to_string(),
            FieldKind::Object(schema) => format!("object `{}`", schema.name),
            FieldKind::ObjectArray(schema) => format!("array of `{}` objects", schema.name),
        }
    }
}

/// A named field with free-text guidance for the model
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub guidance: &'static str,
    pub required: bool,
}

impl Field {
    pub fn new(name: &'static str, kind: FieldKind, guidance: &'static str) -> Self {
        Self {
            name,
            kind,
            guidance,
            required: true,
        }
    }

    pub fn string(name: &'static str, guidance: &'static str) -> Self {
        Self::new(name, FieldKind::String, guidance)
    }

    pub fn integer(name: &'static str, min: i64, max: i64, guidance: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::Integer {
                min: Some(min),
                max: Some(max),
            },
            guidance,
        )
    }

    pub fn number(name: &'static str, min: f64, max: f64, guidance: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::Number {
                min: Some(min),
                max: Some(max),
            },
            guidance,
        )
    }

    pub fn boolean(name: &'static str, guidance: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, guidance)
    }

    pub fn enumeration(
        name: &'static str,
        values: &[&'static str],
        guidance: &'static str,
    ) -> Self {
        Self::new(name, FieldKind::Enumeration(values.to_vec()), guidance)
    }

    pub fn strings(name: &'static str, guidance: &'static str) -> Self {
        Self::new(name, FieldKind::StringArray, guidance)
    }

    pub fn objects(name: &'static str, schema: Schema, guidance: &'static str) -> Self {
        Self::new(name, FieldKind::ObjectArray(schema), guidance)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Explicit description of a structured response
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Format instructions appended to a prompt so the model answers in this shape
    pub fn render_instructions(&self) -> String {
        let mut out = String::new();
        out.push_str("## Required Response Format\n\n");
        out.push_str(&format!(
            "Respond with a single JSON object (`{}`): {}\n",
            self.name, self.description
        ));
        out.push_str("Do not wrap it in prose. Fields:\n");
        self.render_fields(&mut out, 0);
        out
    }

    fn render_fields(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for field in &self.fields {
            out.push_str(&format!(
                "{}- \"{}\" ({}{}): {}\n",
                indent,
                field.name,
                field.kind.describe(),
                if field.required { "" } else { ", optional" },
                field.guidance
            ));
            match &field.kind {
                FieldKind::Object(nested) | FieldKind::ObjectArray(nested) => {
                    nested.render_fields(out, depth + 1);
                }
                _ => {}
            }
        }
    }

    /// Coerce a loosely-typed model value into this schema's shape.
    ///
    /// Keys are matched ignoring case and `_`/`-` separators, numbers and
    /// booleans given as strings are parsed, floats are rounded for integer
    /// fields and enumeration values are canonicalised. Unknown keys are
    /// dropped. Array elements that fail to coerce are skipped.
    pub fn coerce_and_validate(&self, value: Value) -> Result<Value, GenerationError> {
        let mut source = match value {
            Value::Object(map) => map,
            // A bare array is accepted for single-array schemas
            Value::Array(items) if self.single_array_field().is_some() => {
                let mut map = Map::new();
                if let Some(field) = self.single_array_field() {
                    map.insert(field.name.to_string(), Value::Array(items));
                }
                map
            }
            other => {
                return Err(self.error(format!("expected a JSON object, got {}", type_name(&other))))
            }
        };

        let mut out = Map::new();
        for field in &self.fields {
            let raw = take_key(&mut source, field.name);
            match raw {
                None | Some(Value::Null) => {
                    if field.required {
                        // Arrays default to empty rather than failing the whole response
                        if matches!(field.kind, FieldKind::StringArray | FieldKind::ObjectArray(_)) {
                            out.insert(field.name.to_string(), Value::Array(Vec::new()));
                            continue;
                        }
                        return Err(self.error(format!("missing required field `{}`", field.name)));
                    }
                }
                Some(raw) => {
                    let coerced = self.coerce_field(field, raw)?;
                    out.insert(field.name.to_string(), coerced);
                }
            }
        }
        Ok(Value::Object(out))
    }

    fn single_array_field(&self) -> Option<&Field> {
        match self.fields.as_slice() {
            [field] if matches!(field.kind, FieldKind::StringArray | FieldKind::ObjectArray(_)) => {
                Some(field)
            }
            _ => None,
        }
    }

    fn coerce_field(&self, field: &Field, raw: Value) -> Result<Value, GenerationError> {
        let name = field.name;
        match &field.kind {
            FieldKind::String => Ok(match raw {
                Value::String(s) => Value::String(s),
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(value_to_text)
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
                other => Value::String(value_to_text(&other)),
            }),
            FieldKind::Integer { .. } => {
                let n = as_f64(&raw)
                    .ok_or_else(|| self.error(format!("field `{}` is not an integer", name)))?;
                Ok(Value::Number(Number::from(n.round() as i64)))
            }
            FieldKind::Number { .. } => {
                let n = as_f64(&raw)
                    .ok_or_else(|| self.error(format!("field `{}` is not a number", name)))?;
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| self.error(format!("field `{}` is not finite", name)))
            }
            FieldKind::Boolean => as_bool(&raw)
                .map(Value::Bool)
                .ok_or_else(|| self.error(format!("field `{}` is not a boolean", name))),
            FieldKind::Enumeration(values) => {
                let text = value_to_text(&raw);
                let wanted = normalize_key(&text);
                values
                    .iter()
                    .find(|v| normalize_key(v) == wanted)
                    .map(|v| Value::String((*v).to_string()))
                    .ok_or_else(|| {
                        self.error(format!(
                            "field `{}` has value `{}`, expected one of {:?}",
                            name, text, values
                        ))
                    })
            }
            FieldKind::StringArray => Ok(match raw {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter(|v| !v.is_null())
                        .map(|v| Value::String(value_to_text(v)))
                        .collect(),
                ),
                Value::String(s) if s.trim().is_empty() => Value::Array(Vec::new()),
                other => Value::Array(vec![Value::String(value_to_text(&other))]),
            }),
            FieldKind::Object(nested) => nested.coerce_and_validate(raw),
            FieldKind::ObjectArray(nested) => {
                let items = match raw {
                    Value::Array(items) => items,
                    single @ Value::Object(_) => vec![single],
                    other => {
                        return Err(self.error(format!(
                            "field `{}` should be an array, got {}",
                            name,
                            type_name(&other)
                        )))
                    }
                };
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    match nested.coerce_and_validate(item) {
                        Ok(v) => kept.push(v),
                        Err(e) => debug!(field = name, error = %e, "Skipping malformed array element"),
                    }
                }
                Ok(Value::Array(kept))
            }
        }
    }

    fn error(&self, reason: String) -> GenerationError {
        GenerationError::Schema {
            schema: self.name.to_string(),
            reason,
        }
    }
}

fn take_key(map: &mut Map<String, Value>, name: &str) -> Option<Value> {
    if let Some(v) = map.remove(name) {
        return Some(v);
    }
    let wanted = normalize_key(name);
    let key = map.keys().find(|k| normalize_key(k) == wanted).cloned()?;
    map.remove(&key)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict_schema() -> Schema {
        Schema::new("Verdict", "A verdict")
            .field(Field::enumeration(
                "verdict",
                &["correct", "incorrect", "partially_correct", "unknown"],
                "The verdict",
            ))
            .field(Field::number("confidence", 0.0, 1.0, "Confidence"))
            .field(Field::integer("score", 1, 10, "Score"))
            .field(Field::strings("quotes", "Quotes"))
            .field(Field::string("correction", "Correction").optional())
    }

    #[test]
    fn test_coerces_loose_values() {
        let raw = json!({
            "Verdict": "partiallyCorrect",
            "confidence": "0.8",
            "score": 7.6,
            "quotes": "only one",
            "extra": true
        });
        let value = verdict_schema().coerce_and_validate(raw).unwrap();
        assert_eq!(value["verdict"], "partially_correct");
        assert_eq!(value["confidence"], 0.8);
        assert_eq!(value["score"], 8);
        assert_eq!(value["quotes"], json!(["only one"]));
        assert!(value.get("extra").is_none());
        assert!(value.get("correction").is_none());
    }

    #[test]
    fn test_missing_required_field_fails() {
        let raw = json!({"verdict": "correct", "score": 3});
        let err = verdict_schema().coerce_and_validate(raw).unwrap_err();
        assert!(matches!(err, GenerationError::Schema { .. }));
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn test_unknown_enumeration_fails() {
        let raw = json!({"verdict": "maybe", "confidence": 0.5, "score": 3});
        assert!(verdict_schema().coerce_and_validate(raw).is_err());
    }

    #[test]
    fn test_missing_array_defaults_to_empty() {
        let raw = json!({"verdict": "unknown", "confidence": 0, "score": 1});
        let value = verdict_schema().coerce_and_validate(raw).unwrap();
        assert_eq!(value["quotes"], json!([]));
    }

    #[test]
    fn test_object_array_skips_malformed_elements() {
        let item = Schema::new("Item", "An item").field(Field::string("text", "Text"));
        let schema = Schema::new("Items", "Items").field(Field::objects("items", item, "Items"));

        let value = schema
            .coerce_and_validate(json!([{"text": "a"}, {"other": 1}, {"text": "b"}]))
            .unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_render_instructions_lists_fields() {
        let text = verdict_schema().render_instructions();
        assert!(text.contains("\"verdict\" (one of: correct | incorrect"));
        assert!(text.contains("\"correction\" (string, optional)"));
        assert!(text.contains("integer 1..10"));
    }
}

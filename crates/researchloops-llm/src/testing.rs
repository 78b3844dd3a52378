//! Scripted generator for tests.
//!
//! Responses are queued per schema name. When a queue is empty the
//! schema's standing response (set with [`ScriptedGenerator::always`]) is
//! used; with neither, the call fails with [`GenerationError::Unavailable`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::{GenerationError, Schema, StructuredGenerator};

#[derive(Debug, Clone)]
enum Scripted {
    Value(Value),
    Failure(String),
}

impl Scripted {
    fn produce(&self) -> Result<Value, GenerationError> {
        match self {
            Scripted::Value(v) => Ok(v.clone()),
            Scripted::Failure(msg) => Err(GenerationError::Format(msg.clone())),
        }
    }
}

#[derive(Default)]
pub struct ScriptedGenerator {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    standing: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for a schema
    pub fn push(&self, schema: &str, value: Value) {
        self.enqueue(schema, Scripted::Value(value));
    }

    /// Queue a one-shot format failure for a schema
    pub fn push_failure(&self, schema: &str, message: &str) {
        self.enqueue(schema, Scripted::Failure(message.to_string()));
    }

    /// Respond to every otherwise-unscripted call for a schema with `value`
    pub fn always(&self, schema: &str, value: Value) {
        lock(&self.standing).insert(schema.to_string(), Scripted::Value(value));
    }

    /// Fail every otherwise-unscripted call for a schema
    pub fn always_fail(&self, schema: &str, message: &str) {
        lock(&self.standing).insert(schema.to_string(), Scripted::Failure(message.to_string()));
    }

    /// Total number of calls made
    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of calls made for one schema
    pub fn calls_for(&self, schema: &str) -> usize {
        lock(&self.calls).iter().filter(|(s, _)| s == schema).count()
    }

    /// Prompts submitted for one schema, in order
    pub fn prompts_for(&self, schema: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(s, _)| s == schema)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn enqueue(&self, schema: &str, item: Scripted) {
        lock(&self.queued)
            .entry(schema.to_string())
            .or_default()
            .push_back(item);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_value(&self, prompt: &str, schema: &Schema) -> Result<Value, GenerationError> {
        lock(&self.calls).push((schema.name.to_string(), prompt.to_string()));

        let queued = lock(&self.queued)
            .get_mut(schema.name)
            .and_then(|q| q.pop_front());
        if let Some(item) = queued {
            return item.produce();
        }
        if let Some(item) = lock(&self.standing).get(schema.name) {
            return item.produce();
        }
        Err(GenerationError::Unavailable(format!(
            "no scripted response for `{}`",
            schema.name
        )))
    }
}

//! # researchloops-llm
//!
//! The structured generation capability every evaluation component is built on.
//!
//! A component describes the shape it expects with a [`Schema`], submits a
//! prompt through a [`StructuredGenerator`], and receives a typed value or a
//! [`GenerationError`]. Output coercion and validation are plain functions on
//! the schema, so a sloppy model response (fenced JSON, floats where integers
//! were asked for, `"partiallyCorrect"` for `partially_correct`) still parses.
//!
//! ## Key Types
//!
//! - [`StructuredGenerator`] - The `generate(prompt, schema)` capability
//! - [`Schema`] / [`Field`] / [`FieldKind`] - Explicit response descriptors
//! - [`Generable`] - Binds a response record to its schema
//! - [`AgentGenerator`] - Generator backed by a coding-agent CLI process
//! - [`testing::ScriptedGenerator`] - Canned responses for tests

mod agent;
mod generator;
mod output;
mod schema;
mod spawner;
pub mod testing;

pub use agent::{AgentConfig, AgentError, AgentGenerator, AgentKind};
pub use generator::{extract_json, GenerationError, StructuredGenerator};
pub use output::AgentOutput;
pub use schema::{Field, FieldKind, Generable, Schema};
pub use spawner::ProcessSpawner;

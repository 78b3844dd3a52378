//! # researchloops-logging
//!
//! Progress events and logging for the evaluation and tuning pipeline.
//!
//! ## Key Types
//!
//! - [`EvaluationProgress`] - Tagged union of pipeline progress events
//! - [`Logger`] - Renders events to the console and an optional JSONL file
//! - [`ProgressCallback`] - How components report progress without owning a logger
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)

mod events;

pub use events::{EvaluationProgress, LogFormat, Logger, ProgressCallback};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}

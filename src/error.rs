//! Error taxonomy for the generation core

use thiserror::Error;

/// Errors surfaced by the ledger, store, parser and orchestrator.
///
/// Nothing inside the core retries or swallows these; the caller decides
/// how to report them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("chapter {index} not found in project {project_id}")]
    ChapterNotFound { project_id: String, index: u32 },

    /// External model failed, timed out, or answered with nothing.
    #[error("model call failed: {0}")]
    ModelCall(String),

    /// No JSON object could be salvaged from the model output.
    #[error("failed to parse model output: {message}\n--- output excerpt ---\n{excerpt}")]
    Parse { message: String, excerpt: String },

    /// Valid JSON, but a required top-level key is missing.
    #[error("{stage} response is missing required field `{field}`")]
    Schema { stage: &'static str, field: &'static str },

    /// Persisted document changed since it was loaded.
    #[error("project {0} was modified concurrently; reload and retry")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

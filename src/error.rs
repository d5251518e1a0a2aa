use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a single extraction task.
///
/// Unresolved names, malformed LLM payloads and duplicate edges are not
/// errors: they are handled where they occur and only show up as smaller
/// counts in the run summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No raw snapshot matched `<prefix>*.json` in the snapshot directory.
    #[error("no raw snapshot matches {pattern}")]
    MissingSourceFile { pattern: String },

    /// A consolidated entity (or checkpoint) file the task depends on is absent.
    #[error("required file {} is missing; run the step that produces it first", path.display())]
    MissingEntityFile { path: PathBuf },

    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

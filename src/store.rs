use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PipelineError, Result};

// ═══════════════════════════════════════════════════════════════════════
//  JSON FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════

/// Read a JSON file that must exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(PipelineError::MissingEntityFile {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "read json");
    serde_json::from_str(&text).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a JSON file, or `None` when it does not exist yet.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// Pretty-print `data` to `path`, replacing any previous content.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over the target, so a crash mid-write never leaves a truncated
/// file behind.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<usize> {
    let io_err = |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(data).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(json.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(path = %path.display(), bytes = json.len(), "wrote json");
    Ok(json.len())
}

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use tracing::info;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::store;

// ── Raw snapshot prefixes written by the crawler ───────────────────

/// Main character list. The crawler names it `character_<timestamp>.json`;
/// matching on the leading digit keeps `character_detail_*` and friends out.
pub const CHARACTER: &str = "character_2";
pub const CHARACTER_DETAIL: &str = "character_detail_";
pub const CHARACTER_VOICE: &str = "character_voice_";
pub const CHARACTER_STRATEGY: &str = "character_strategy_";
pub const WEAPON: &str = "weapon_";
pub const MATERIAL: &str = "material_";
pub const MONSTER: &str = "monster_";
pub const ARTIFACT: &str = "artifact_";

/// A candidate snapshot file and its modification time.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Pick the newest file whose name is `<prefix>*.json`.
///
/// Older runs of the crawler are ignored entirely. Ties keep the first
/// candidate in listing order.
pub fn select_newest<'a>(listing: &'a [SnapshotFile], prefix: &str) -> Option<&'a SnapshotFile> {
    listing
        .iter()
        .filter(|f| matches_prefix(&f.path, prefix))
        .fold(None, |best: Option<&SnapshotFile>, f| match best {
            Some(b) if b.modified >= f.modified => Some(b),
            _ => Some(f),
        })
}

fn matches_prefix(path: &Path, prefix: &str) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    file_name.starts_with(prefix) && file_name.ends_with(".json")
}

/// List the regular files directly inside `dir` with their mtimes.
pub fn list_dir(dir: &Path) -> Vec<SnapshotFile> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some(SnapshotFile {
                path: e.path().to_path_buf(),
                modified,
            })
        })
        .collect()
}

/// Locate the newest snapshot for `prefix` in `dir`.
pub fn latest_snapshot(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let listing = list_dir(dir);
    select_newest(&listing, prefix)
        .map(|f| f.path.clone())
        .ok_or_else(|| PipelineError::MissingSourceFile {
            pattern: dir.join(format!("{prefix}*.json")).display().to_string(),
        })
}

/// Load the newest snapshot for `prefix` as a JSON array of records.
pub fn load_latest<T: DeserializeOwned>(dir: &Path, prefix: &str) -> Result<Vec<T>> {
    let path = latest_snapshot(dir, prefix)?;
    info!(file = %path.display(), "reading raw snapshot");
    store::read_json(&path)
}

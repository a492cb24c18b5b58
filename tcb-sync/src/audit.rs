//! Local audit artifacts
//!
//! Dry-run payloads and duplicate-cluster reports land as timestamped JSON
//! files under the configured data directory. These exist purely for
//! operator inspection; no later run reads them back.

use std::path::{Path, PathBuf};
use tcb_common::Result;

/// Write a pretty-printed JSON artifact, returning its path.
pub fn write_artifact(
    data_dir: &Path,
    prefix: &str,
    payload: &serde_json::Value,
) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let stamp = chrono::Utc::now()
        .format("%Y-%m-%dT%H-%M-%S%.3f")
        .to_string();
    let path = data_dir.join(format!("{prefix}-{stamp}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(payload).unwrap_or_default())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_lands_in_data_dir_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), "upsert", &json!({"inputs": []})).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("upsert-"));
        assert!(name.ends_with(".json"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("inputs"));
    }
}
